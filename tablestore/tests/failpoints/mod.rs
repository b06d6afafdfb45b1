mod backup_test;
