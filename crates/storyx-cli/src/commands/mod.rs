pub mod delete;
pub mod snapshot;
pub mod warning;

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use storyx_core::CompactionPolicy;
use storyx_engine::{
    apply_engine_command, apply_engine_query, EngineCommand, EngineCommandResult, EngineQuery,
    EngineQueryResult,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// An open, migrated database bound to one project
pub struct Session {
    pub conn: Connection,
    pub project: String,
    pub policy: CompactionPolicy,
}

impl Session {
    pub fn open(
        db_path: &Path,
        project: String,
        policy: CompactionPolicy,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = storyx_store::db::open_and_migrate(db_path)?;
        Ok(Self {
            conn,
            project,
            policy,
        })
    }

    pub fn command(
        &mut self,
        cmd: EngineCommand,
    ) -> Result<EngineCommandResult, Box<dyn std::error::Error>> {
        Ok(apply_engine_command(
            cmd,
            &self.project,
            &mut self.conn,
            &self.policy,
        )?)
    }

    pub fn query(&self, query: EngineQuery) -> Result<EngineQueryResult, Box<dyn std::error::Error>> {
        Ok(apply_engine_query(query, &self.project, &self.conn)?)
    }
}

/// Read a JSON document from `input`, or from stdin when it is absent or `-`
pub fn read_json<T: DeserializeOwned>(input: Option<&Path>) -> Result<T, Box<dyn std::error::Error>> {
    let raw = match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
