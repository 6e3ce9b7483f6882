//! Per-OS telemetry command templates and output parsing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{LifecycleError, LifecycleResult};
use crate::session::OsFamily;

use super::IdleSnapshot;

/// Builds the remote diagnostic command for one OS family and parses its
/// output into an [`IdleSnapshot`].
pub trait TelemetryStrategy: Send + Sync {
    /// Remote-command document to execute the script with.
    fn document_name(&self) -> &'static str;

    /// Script lines probing the remote-display server and CPU usage. The
    /// script must print a JSON object with the four telemetry fields.
    fn commands(&self) -> Vec<String>;

    /// Parse the script's stdout into a snapshot.
    fn parse_output(&self, raw: &str) -> LifecycleResult<IdleSnapshot> {
        parse_idle_payload(raw)
    }
}

/// Select the strategy for an OS family.
pub fn strategy_for(os_family: OsFamily) -> &'static dyn TelemetryStrategy {
    match os_family {
        OsFamily::Linux => &LinuxTelemetry,
        OsFamily::Windows => &WindowsTelemetry,
    }
}

/// Linux probe: `dcv describe-session` piped through jq, CPU from `top`.
pub struct LinuxTelemetry;

impl TelemetryStrategy for LinuxTelemetry {
    fn document_name(&self) -> &'static str {
        "AWS-RunShellScript"
    }

    fn commands(&self) -> Vec<String> {
        vec![
            // send-command cannot `source`, so read the session id directly
            "export DESKTOP_SESSION_ID=$(cat /etc/environment | grep DESKTOP_SESSION_ID= | awk -F'=' '{print $2}')".to_string(),
            "DCV_Describe_Session=$(dcv describe-session $DESKTOP_SESSION_ID -j)".to_string(),
            r#"echo "${DCV_Describe_Session}" | jq --arg CPUAveragePerformanceLast10Secs "$(top -d 5 -b -n2 | grep 'Cpu(s)' | tail -n 1 | awk '{print $2 + $4}')" '{"DCVCurrentConnections": .["num-of-connections"], "DCVCreationTime": .["creation-time"], "DCVLastDisconnectTime": .["last-disconnection-time"], "CPUAveragePerformanceLast10Secs": $CPUAveragePerformanceLast10Secs }'"#.to_string(),
        ]
    }
}

/// Windows probe: `dcv describe-session` plus processor perf counters.
pub struct WindowsTelemetry;

impl TelemetryStrategy for WindowsTelemetry {
    fn document_name(&self) -> &'static str {
        "AWS-RunPowerShellScript"
    }

    fn commands(&self) -> Vec<String> {
        vec![
            r#"$DCV_Describe_Session = Invoke-Expression "& 'C:\Program Files\NICE\DCV\Server\bin\dcv' describe-session $env:DESKTOP_SESSION_ID -j" | ConvertFrom-Json"#.to_string(),
            r#"$CPUAveragePerformanceLast10Secs = (GET-COUNTER -Counter "\Processor(_Total)\% Processor Time" -SampleInterval 2 -MaxSamples 5 |select -ExpandProperty countersamples | select -ExpandProperty cookedvalue | Measure-Object -Average).average"#.to_string(),
            "$output = @{}".to_string(),
            r#"$output["CPUAveragePerformanceLast10Secs"] = $CPUAveragePerformanceLast10Secs"#.to_string(),
            r#"$output["DCVCurrentConnections"] = $DCV_Describe_Session."num-of-connections""#.to_string(),
            r#"$output["DCVCreationTime"] = $DCV_Describe_Session."creation-time""#.to_string(),
            r#"$output["DCVLastDisconnectTime"] = $DCV_Describe_Session."last-disconnection-time""#.to_string(),
            "$output | ConvertTo-Json".to_string(),
        ]
    }
}

/// Parse the four-field JSON payload shared by both OS scripts. The shell
/// variants emit numbers as strings and the PowerShell variants emit real
/// numbers, so both representations are accepted per field.
pub fn parse_idle_payload(raw: &str) -> LifecycleResult<IdleSnapshot> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| LifecycleError::Parse(format!("telemetry output is not JSON: {e}")))?;

    let connections = int_field(&value, "DCVCurrentConnections")?;
    let cpu_avg_pct = float_field(&value, "CPUAveragePerformanceLast10Secs")?;

    let creation = timestamp_field(&value, "DCVCreationTime")?
        .ok_or_else(|| LifecycleError::Parse("DCVCreationTime is missing or empty".to_string()))?;
    // An empty disconnect time means the desktop was launched but never
    // accessed; age it from its creation time instead.
    let last_disconnect = timestamp_field(&value, "DCVLastDisconnectTime")?.unwrap_or(creation);

    Ok(IdleSnapshot {
        connections,
        cpu_avg_pct,
        last_disconnect,
    })
}

fn int_field(value: &Value, key: &str) -> LifecycleResult<i64> {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| LifecycleError::Parse(format!("{key} is not an integer: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| LifecycleError::Parse(format!("{key} is not an integer: {e}"))),
        other => Err(LifecycleError::Parse(format!(
            "{key} is missing or has unexpected type: {other:?}"
        ))),
    }
}

fn float_field(value: &Value, key: &str) -> LifecycleResult<f64> {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| LifecycleError::Parse(format!("{key} is not a number: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| LifecycleError::Parse(format!("{key} is not a number: {e}"))),
        other => Err(LifecycleError::Parse(format!(
            "{key} is missing or has unexpected type: {other:?}"
        ))),
    }
}

/// Parse an ISO-8601 timestamp field. An empty string or null yields `None`.
fn timestamp_field(value: &Value, key: &str) -> LifecycleResult<Option<DateTime<Utc>>> {
    match value.get(key) {
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| LifecycleError::Parse(format!("{key} is not a valid timestamp: {e}"))),
        Some(Value::Null) | None => Ok(None),
        other => Err(LifecycleError::Parse(format!(
            "{key} has unexpected type: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shell_style_payload_with_string_numbers() {
        let raw = r#"{
            "DCVCurrentConnections": "0",
            "DCVCreationTime": "2026-03-01T10:00:00Z",
            "DCVLastDisconnectTime": "2026-03-02T05:00:00Z",
            "CPUAveragePerformanceLast10Secs": "2.4"
        }"#;
        let snapshot = parse_idle_payload(raw).unwrap();
        assert_eq!(snapshot.connections, 0);
        assert!((snapshot.cpu_avg_pct - 2.4).abs() < f64::EPSILON);
        assert_eq!(
            snapshot.last_disconnect,
            DateTime::parse_from_rfc3339("2026-03-02T05:00:00Z").unwrap()
        );
    }

    #[test]
    fn parses_powershell_style_payload_with_real_numbers() {
        let raw = r#"{
            "DCVCurrentConnections": 1,
            "DCVCreationTime": "2026-03-01T10:00:00+00:00",
            "DCVLastDisconnectTime": "2026-03-01T12:00:00+00:00",
            "CPUAveragePerformanceLast10Secs": 37.5
        }"#;
        let snapshot = parse_idle_payload(raw).unwrap();
        assert_eq!(snapshot.connections, 1);
        assert!((snapshot.cpu_avg_pct - 37.5).abs() < f64::EPSILON);
    }

    #[test]
    fn never_disconnected_falls_back_to_creation_time() {
        let raw = r#"{
            "DCVCurrentConnections": 0,
            "DCVCreationTime": "2026-03-01T10:00:00Z",
            "DCVLastDisconnectTime": "",
            "CPUAveragePerformanceLast10Secs": 1.0
        }"#;
        let snapshot = parse_idle_payload(raw).unwrap();
        assert_eq!(
            snapshot.last_disconnect,
            DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn rejects_garbage_output() {
        assert!(parse_idle_payload("no desktop here").is_err());
        assert!(parse_idle_payload("{}").is_err());
        let missing_creation = r#"{
            "DCVCurrentConnections": 0,
            "DCVCreationTime": "",
            "DCVLastDisconnectTime": "",
            "CPUAveragePerformanceLast10Secs": 1.0
        }"#;
        assert!(parse_idle_payload(missing_creation).is_err());
    }

    #[test]
    fn strategies_use_the_right_documents() {
        assert_eq!(
            strategy_for(crate::session::OsFamily::Linux).document_name(),
            "AWS-RunShellScript"
        );
        assert_eq!(
            strategy_for(crate::session::OsFamily::Windows).document_name(),
            "AWS-RunPowerShellScript"
        );
        assert!(!strategy_for(crate::session::OsFamily::Linux).commands().is_empty());
    }
}
