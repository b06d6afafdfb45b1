mod backup_test;
mod modifier_test;
mod overflow_test;
mod query_test;
mod repository_test;
