mod step_records;
