//! Background execution of external utilities such as `psql`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{NodeError, NodeResult};
use crate::model::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub desc: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A command line to run in the background.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCommand {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl JobCommand {
    /// `psql` against one database of `server`, running `sql`.
    pub fn psql(psql_path: &str, server: &Server, database: &str, sql: &str) -> Self {
        let mut envs = Vec::new();
        if let Some(password) = &server.password {
            envs.push(("PGPASSWORD".to_string(), password.clone()));
        }
        JobCommand {
            program: psql_path.to_string(),
            args: vec![
                "--host".to_string(),
                server.host.clone(),
                "--port".to_string(),
                server.port.to_string(),
                "--username".to_string(),
                server.username.clone(),
                "--dbname".to_string(),
                database.to_string(),
                "--no-psqlrc".to_string(),
                "--set".to_string(),
                "ON_ERROR_STOP=1".to_string(),
                "--command".to_string(),
                sql.to_string(),
            ],
            envs,
        }
    }
}

/// Registry of spawned jobs, polled through `/misc/bgprocess`.
#[derive(Default)]
pub struct BackgroundJobs {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `command` and return its job id immediately. The record is
    /// updated once the process exits.
    pub fn spawn(self: &Arc<Self>, desc: impl Into<String>, command: JobCommand) -> NodeResult<JobRecord> {
        let id = Uuid::new_v4().simple().to_string();
        let desc = desc.into();

        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                log::error!("Failed to start {}: {}", command.program, e);
                NodeError::Internal(format!("Failed to start {}: {}", command.program, e))
            })?;

        let record = JobRecord {
            id: id.clone(),
            desc,
            status: JobStatus::Running,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            start_time: Utc::now(),
            end_time: None,
        };
        self.jobs.lock().insert(id.clone(), record.clone());
        log::info!("Started background job {} ({})", id, record.desc);

        let jobs = Arc::clone(self);
        tokio::spawn(async move {
            let output = child.wait_with_output().await;
            let mut registry = jobs.jobs.lock();
            let Some(record) = registry.get_mut(&id) else {
                return;
            };
            record.end_time = Some(Utc::now());
            match output {
                Ok(output) => {
                    record.exit_code = output.status.code();
                    record.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    record.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                    record.status = if output.status.success() {
                        JobStatus::Finished
                    } else {
                        JobStatus::Failed
                    };
                }
                Err(e) => {
                    record.stderr = e.to_string();
                    record.status = JobStatus::Failed;
                }
            }
            log::info!(
                "Background job {} ended with {:?} (exit code {:?})",
                id,
                record.status,
                record.exit_code
            );
        });

        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().get(id).cloned()
    }

    /// Release the record of a job that has ended.
    pub fn remove(&self, id: &str) -> NodeResult<JobRecord> {
        let mut jobs = self.jobs.lock();
        let status = jobs
            .get(id)
            .map(|job| job.status)
            .ok_or_else(|| NodeError::gone(format!("Could not find the process with id {}.", id)))?;
        if status == JobStatus::Running {
            return Err(NodeError::BadRequest(format!("Process {} is still running.", id)));
        }
        log::info!("Released background job {}", id);
        jobs.remove(id)
            .ok_or_else(|| NodeError::gone(format!("Could not find the process with id {}.", id)))
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job.start_time);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server() -> Server {
        Server {
            id: 1,
            gid: 1,
            name: "local".into(),
            host: "db.internal".into(),
            port: 5433,
            maintenance_db: "postgres".into(),
            username: "admin".into(),
            password: Some("secret".into()),
            restricted_schemas: None,
        }
    }

    #[test]
    fn test_psql_command_line() {
        let command = JobCommand::psql("/usr/bin/psql", &server(), "shop", "REFRESH MATERIALIZED VIEW v;");
        assert_eq!(command.program, "/usr/bin/psql");
        assert!(command.args.windows(2).any(|w| w == ["--port", "5433"]));
        assert!(command.args.windows(2).any(|w| w == ["--dbname", "shop"]));
        assert_eq!(command.args.last().map(String::as_str), Some("REFRESH MATERIALIZED VIEW v;"));
        assert_eq!(command.envs, vec![("PGPASSWORD".to_string(), "secret".to_string())]);
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let jobs = Arc::new(BackgroundJobs::new());
        let record = jobs
            .spawn(
                "echo",
                JobCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "echo refreshed".into()],
                    envs: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(record.status, JobStatus::Running);

        let mut finished = None;
        for _ in 0..100 {
            let current = jobs.get(&record.id).unwrap();
            if current.status != JobStatus::Running {
                finished = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let finished = finished.expect("job should finish");
        assert_eq!(finished.status, JobStatus::Finished);
        assert_eq!(finished.exit_code, Some(0));
        assert_eq!(finished.stdout.trim(), "refreshed");
        assert_eq!(jobs.list().len(), 1);

        let released = jobs.remove(&record.id).unwrap();
        assert_eq!(released.status, JobStatus::Finished);
        assert!(jobs.get(&record.id).is_none());
        assert!(matches!(jobs.remove(&record.id), Err(NodeError::Gone(_))));
    }

    #[tokio::test]
    async fn test_running_job_is_not_released() {
        let jobs = Arc::new(BackgroundJobs::new());
        let record = jobs
            .spawn(
                "sleep",
                JobCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "sleep 5".into()],
                    envs: Vec::new(),
                },
            )
            .unwrap();

        assert!(matches!(jobs.remove(&record.id), Err(NodeError::BadRequest(_))));
        assert_eq!(jobs.get(&record.id).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let jobs = Arc::new(BackgroundJobs::new());
        let result = jobs.spawn(
            "missing",
            JobCommand {
                program: "/nonexistent/psql-binary".into(),
                args: Vec::new(),
                envs: Vec::new(),
            },
        );
        assert!(matches!(result, Err(NodeError::Internal(_))));
        assert!(jobs.list().is_empty());
    }
}
