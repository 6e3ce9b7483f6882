//! AWS CLI backed fleet and remote-command clients.
//!
//! Drives the EC2/CloudFormation control plane and the SSM command
//! protocol through `aws` subprocess invocations, parsing their JSON
//! responses.

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{LifecycleError, LifecycleResult};
use crate::telemetry::{InstanceOutput, InvocationStatus, RemoteCommandApi};

use super::FleetApi;

/// Fleet and remote-command client shelling out to the AWS CLI.
#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(binary: impl Into<String>, region: Option<String>, profile: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            region,
            profile,
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg("--output").arg("json");
        if let Some(ref region) = self.region {
            cmd.arg("--region").arg(region);
        }
        if let Some(ref profile) = self.profile {
            cmd.arg("--profile").arg(profile);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("spawning {}: {e}", self.binary))?;

        if !output.status.success() {
            let service = args.first().map(String::as_str).unwrap_or("?");
            let action = args.get(1).map(String::as_str).unwrap_or("?");
            return Err(format!(
                "{} {service} {action} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_json(raw: &str) -> Result<Value, String> {
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(raw).map_err(|e| format!("unparseable CLI response: {e}"))
    }
}

/// Map an SSM command status string onto the invocation status enum.
/// Unexpected terminal statuses (cancelled, rate exceeded, ...) count as
/// failures.
fn parse_command_status(status: &str) -> InvocationStatus {
    match status {
        "Pending" => InvocationStatus::Pending,
        "InProgress" => InvocationStatus::InProgress,
        "Success" => InvocationStatus::Succeeded,
        "Failed" => InvocationStatus::Failed,
        other => {
            warn!("unexpected remote command status {other:?}, treating as failed");
            InvocationStatus::Failed
        }
    }
}

#[async_trait]
impl FleetApi for AwsCli {
    async fn start_instances(&self, instance_ids: &[String]) -> LifecycleResult<()> {
        let mut args = vec![
            "ec2".to_string(),
            "start-instances".to_string(),
            "--instance-ids".to_string(),
        ];
        args.extend(instance_ids.iter().cloned());

        self.run(&args).await.map_err(LifecycleError::FleetAction)?;
        Ok(())
    }

    async fn stop_instances(
        &self,
        instance_ids: &[String],
        hibernate: bool,
    ) -> LifecycleResult<()> {
        let mut args = vec![
            "ec2".to_string(),
            "stop-instances".to_string(),
            "--instance-ids".to_string(),
        ];
        args.extend(instance_ids.iter().cloned());
        if hibernate {
            args.push("--hibernate".to_string());
        }

        self.run(&args).await.map_err(LifecycleError::FleetAction)?;
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> LifecycleResult<()> {
        let args = vec![
            "cloudformation".to_string(),
            "delete-stack".to_string(),
            "--stack-name".to_string(),
            stack_name.to_string(),
        ];

        self.run(&args).await.map_err(LifecycleError::FleetAction)?;
        Ok(())
    }
}

#[async_trait]
impl RemoteCommandApi for AwsCli {
    async fn dispatch(
        &self,
        document_name: &str,
        commands: &[String],
        instance_ids: &[String],
    ) -> LifecycleResult<String> {
        let parameters = serde_json::json!({ "commands": commands }).to_string();
        let mut args = vec![
            "ssm".to_string(),
            "send-command".to_string(),
            "--document-name".to_string(),
            document_name.to_string(),
            "--parameters".to_string(),
            parameters,
            "--timeout-seconds".to_string(),
            "30".to_string(),
            "--instance-ids".to_string(),
        ];
        args.extend(instance_ids.iter().cloned());

        let raw = self
            .run(&args)
            .await
            .map_err(LifecycleError::RemoteCommand)?;
        let value = Self::parse_json(&raw).map_err(LifecycleError::RemoteCommand)?;

        value
            .pointer("/Command/CommandId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LifecycleError::RemoteCommand("send-command response has no CommandId".to_string())
            })
    }

    async fn poll_status(&self, invocation_id: &str) -> LifecycleResult<InvocationStatus> {
        let args = vec![
            "ssm".to_string(),
            "list-commands".to_string(),
            "--command-id".to_string(),
            invocation_id.to_string(),
        ];

        let raw = self
            .run(&args)
            .await
            .map_err(LifecycleError::RemoteCommand)?;
        let value = Self::parse_json(&raw).map_err(LifecycleError::RemoteCommand)?;

        let status = value
            .pointer("/Commands/0/Status")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LifecycleError::RemoteCommand(format!(
                    "list-commands response has no status for {invocation_id}"
                ))
            })?;

        Ok(parse_command_status(status))
    }

    async fn fetch_output(
        &self,
        invocation_id: &str,
        instance_id: &str,
    ) -> LifecycleResult<InstanceOutput> {
        let args = vec![
            "ssm".to_string(),
            "get-command-invocation".to_string(),
            "--command-id".to_string(),
            invocation_id.to_string(),
            "--instance-id".to_string(),
            instance_id.to_string(),
        ];

        let raw = self
            .run(&args)
            .await
            .map_err(LifecycleError::RemoteCommand)?;
        let value = Self::parse_json(&raw).map_err(LifecycleError::RemoteCommand)?;

        let status = value
            .get("Status")
            .and_then(Value::as_str)
            .map(parse_command_status)
            .unwrap_or(InvocationStatus::Failed);

        Ok(InstanceOutput {
            status,
            stdout: value
                .get("StandardOutputContent")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            stderr: value
                .get("StandardErrorContent")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_status_mapping() {
        assert_eq!(parse_command_status("Pending"), InvocationStatus::Pending);
        assert_eq!(
            parse_command_status("InProgress"),
            InvocationStatus::InProgress
        );
        assert_eq!(parse_command_status("Success"), InvocationStatus::Succeeded);
        assert_eq!(parse_command_status("Failed"), InvocationStatus::Failed);
        // Anything else is terminal and unusable.
        assert_eq!(
            parse_command_status("Cancelled"),
            InvocationStatus::Failed
        );
        assert_eq!(
            parse_command_status("RateExceeded"),
            InvocationStatus::Failed
        );
    }
}
