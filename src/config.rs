use clap::Args as ClapArgs;
use std::fmt;

#[derive(ClapArgs, Clone, Debug)]
pub struct Config {
    #[arg(long, env = "GA4_PROPERTY_ID", value_parser = non_empty)]
    pub(crate) ga4_property_id: String,

    #[arg(long, env = "BQ_PROJECT_ID", value_parser = non_empty)]
    pub(crate) bq_project_id: String,

    #[arg(long, env = "BQ_DATASET_ID", value_parser = non_empty)]
    pub(crate) bq_dataset_id: String,

    #[arg(long, env = "DEST_TABLE_ID", value_parser = non_empty)]
    pub(crate) dest_table_id: String,
}

impl Config {
    pub fn dest_table_path(&self) -> TablePath {
        TablePath {
            project: self.bq_project_id.clone(),
            dataset: self.bq_dataset_id.clone(),
            table: self.dest_table_id.clone(),
        }
    }
}

fn non_empty(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(s.to_string())
}

/// Fully-qualified destination table, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePath {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}
