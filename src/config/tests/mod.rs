mod tests_store_config;
