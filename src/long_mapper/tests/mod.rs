mod tests_mappers;
