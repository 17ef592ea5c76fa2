pub mod helpers;
mod tests_cache;
mod tests_rehash;
