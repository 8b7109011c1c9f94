//! State machine control plane over the AWS JSON 1.0 protocol.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use stepctl_core::Tags;

use super::client::{epoch_seconds, AwsJsonClient, Empty};
use crate::error::{RemoteError, Result};
use crate::paginate::Page;
use crate::ports::{ExecutionControl, StateMachineCatalog, VersionRegistry};
use crate::types::{
    Alias, AliasListItem, Execution, ExecutionStatus, HistoryEvent, LogLevel,
    LoggingConfiguration, PublishedVersion, RoutingEntry, StartedExecution, StateMachine,
    StateMachineListItem, StateMachineStatus, StateMachineType, TracingConfiguration,
    VersionListItem,
};

const TARGET_PREFIX: &str = "AWSStepFunctions";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// HTTP adapter for the state machine catalog, versions and executions.
#[derive(Debug, Clone)]
pub struct HttpStateMachineApi {
    client: AwsJsonClient,
}

impl HttpStateMachineApi {
    /// Create an adapter targeting `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client: AwsJsonClient::new(http, endpoint, TARGET_PREFIX, CONTENT_TYPE),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTag {
    key: String,
    value: String,
}

fn wire_tags(tags: &Tags) -> Vec<WireTag> {
    tags.iter()
        .map(|t| WireTag {
            key: t.key.clone(),
            value: t.value.clone(),
        })
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogGroup {
    log_group_arn: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogDestination {
    cloud_watch_logs_log_group: WireLogGroup,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogging {
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    include_execution_data: bool,
    #[serde(default)]
    destinations: Vec<WireLogDestination>,
}

impl From<&LoggingConfiguration> for WireLogging {
    fn from(config: &LoggingConfiguration) -> Self {
        Self {
            level: Some(config.level),
            include_execution_data: config.include_execution_data,
            destinations: config
                .destinations
                .iter()
                .map(|arn| WireLogDestination {
                    cloud_watch_logs_log_group: WireLogGroup {
                        log_group_arn: arn.clone(),
                    },
                })
                .collect(),
        }
    }
}

impl From<WireLogging> for LoggingConfiguration {
    fn from(wire: WireLogging) -> Self {
        Self {
            level: wire.level.unwrap_or_default(),
            include_execution_data: wire.include_execution_data,
            destinations: wire
                .destinations
                .into_iter()
                .map(|d| d.cloud_watch_logs_log_group.log_group_arn)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListStateMachinesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListStateMachinesOutput {
    #[serde(default)]
    state_machines: Vec<WireStateMachineItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStateMachineItem {
    state_machine_arn: String,
    name: String,
    creation_date: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArnInput<'a> {
    state_machine_arn: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeStateMachineOutput {
    state_machine_arn: String,
    name: String,
    status: Option<String>,
    definition: String,
    role_arn: String,
    #[serde(rename = "type", default)]
    machine_type: StateMachineType,
    creation_date: Option<f64>,
    #[serde(default)]
    logging_configuration: WireLogging,
    #[serde(default)]
    tracing_configuration: Option<TracingConfiguration>,
    revision_id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStateMachineInput<'a> {
    name: &'a str,
    definition: &'a str,
    role_arn: &'a str,
    #[serde(rename = "type")]
    machine_type: StateMachineType,
    logging_configuration: WireLogging,
    tracing_configuration: TracingConfiguration,
    tags: Vec<WireTag>,
    publish: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStateMachineOutput {
    state_machine_arn: String,
    creation_date: Option<f64>,
    state_machine_version_arn: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStateMachineInput<'a> {
    state_machine_arn: &'a str,
    definition: &'a str,
    role_arn: &'a str,
    logging_configuration: WireLogging,
    tracing_configuration: TracingConfiguration,
    publish: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStateMachineOutput {
    update_date: Option<f64>,
    state_machine_version_arn: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TagResourceInput<'a> {
    resource_arn: &'a str,
    tags: Vec<WireTag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceArnInput<'a> {
    resource_arn: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListTagsOutput {
    #[serde(default)]
    tags: Vec<WireTag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PagedArnInput<'a> {
    state_machine_arn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsOutput {
    #[serde(default)]
    state_machine_versions: Vec<WireVersionItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVersionItem {
    state_machine_version_arn: String,
    creation_date: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionArnInput<'a> {
    state_machine_version_arn: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAliasesOutput {
    #[serde(default)]
    state_machine_aliases: Vec<WireAliasItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAliasItem {
    state_machine_alias_arn: String,
    creation_date: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoutingEntry {
    state_machine_version_arn: String,
    weight: u8,
}

fn wire_routing(routing: &[RoutingEntry]) -> Vec<WireRoutingEntry> {
    routing
        .iter()
        .map(|r| WireRoutingEntry {
            state_machine_version_arn: r.version_arn.clone(),
            weight: r.weight,
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AliasArnInput<'a> {
    state_machine_alias_arn: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeAliasOutput {
    state_machine_alias_arn: String,
    name: String,
    description: Option<String>,
    #[serde(default)]
    routing_configuration: Vec<WireRoutingEntry>,
    creation_date: Option<f64>,
    update_date: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAliasInput<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    routing_configuration: Vec<WireRoutingEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAliasOutput {
    state_machine_alias_arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAliasInput<'a> {
    state_machine_alias_arn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    routing_configuration: Vec<WireRoutingEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionInput<'a> {
    state_machine_arn: &'a str,
    name: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionOutput {
    execution_arn: String,
    start_date: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopExecutionInput<'a> {
    execution_arn: &'a str,
    error: &'a str,
    cause: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionArnInput<'a> {
    execution_arn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeExecutionOutput {
    execution_arn: String,
    name: String,
    status: String,
    start_date: Option<f64>,
    stop_date: Option<f64>,
    output: Option<String>,
    error: Option<String>,
    cause: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryOutput {
    #[serde(default)]
    events: Vec<WireHistoryEvent>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireHistoryEvent {
    id: u64,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: Option<f64>,
}

fn published(
    state_machine_arn: String,
    version_arn: Option<String>,
    date: Option<f64>,
) -> Result<PublishedVersion> {
    let version_arn = version_arn.ok_or_else(|| {
        RemoteError::InvalidResponse(format!(
            "no version ARN returned for {state_machine_arn}; was the version published?"
        ))
    })?;
    Ok(PublishedVersion {
        state_machine_arn,
        version_arn,
        timestamp: date.and_then(epoch_seconds).unwrap_or_else(Utc::now),
    })
}

// ============================================================================
// Port implementations
// ============================================================================

#[async_trait]
impl StateMachineCatalog for HttpStateMachineApi {
    async fn list_state_machines(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<StateMachineListItem>> {
        let out: ListStateMachinesOutput = self
            .client
            .call("ListStateMachines", &ListStateMachinesInput { next_token })
            .await?;
        Ok(Page {
            items: out
                .state_machines
                .into_iter()
                .map(|sm| StateMachineListItem {
                    name: sm.name,
                    arn: sm.state_machine_arn,
                    creation_date: sm.creation_date.and_then(epoch_seconds),
                })
                .collect(),
            next_token: out.next_token,
        })
    }

    async fn describe_state_machine(&self, arn: &str) -> Result<StateMachine> {
        let out: DescribeStateMachineOutput = self
            .client
            .call("DescribeStateMachine", &ArnInput { state_machine_arn: arn })
            .await?;
        Ok(StateMachine {
            name: out.name,
            arn: Some(out.state_machine_arn),
            definition: out.definition,
            role_arn: out.role_arn,
            machine_type: out.machine_type,
            logging: out.logging_configuration.into(),
            tracing: out.tracing_configuration.unwrap_or_default(),
            tags: Tags::new(),
            status: out.status.as_deref().map(StateMachineStatus::from_service),
            creation_date: out.creation_date.and_then(epoch_seconds),
            revision_id: out.revision_id,
            description: out.description,
        })
    }

    async fn create_state_machine(
        &self,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion> {
        let input = CreateStateMachineInput {
            name: &state_machine.name,
            definition: &state_machine.definition,
            role_arn: &state_machine.role_arn,
            machine_type: state_machine.machine_type,
            logging_configuration: (&state_machine.logging).into(),
            tracing_configuration: state_machine.tracing,
            tags: wire_tags(&state_machine.tags),
            publish: true,
            version_description,
        };
        let out: CreateStateMachineOutput =
            self.client.call("CreateStateMachine", &input).await?;
        published(
            out.state_machine_arn,
            out.state_machine_version_arn,
            out.creation_date,
        )
    }

    async fn update_state_machine(
        &self,
        arn: &str,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion> {
        let input = UpdateStateMachineInput {
            state_machine_arn: arn,
            definition: &state_machine.definition,
            role_arn: &state_machine.role_arn,
            logging_configuration: (&state_machine.logging).into(),
            tracing_configuration: state_machine.tracing,
            publish: true,
            version_description,
        };
        let out: UpdateStateMachineOutput =
            self.client.call("UpdateStateMachine", &input).await?;
        published(arn.to_string(), out.state_machine_version_arn, out.update_date)
    }

    async fn delete_state_machine(&self, arn: &str) -> Result<()> {
        let _: Empty = self
            .client
            .call("DeleteStateMachine", &ArnInput { state_machine_arn: arn })
            .await?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let input = TagResourceInput {
            resource_arn: arn,
            tags: wire_tags(tags),
        };
        let _: Empty = self.client.call("TagResource", &input).await?;
        Ok(())
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        let out: ListTagsOutput = self
            .client
            .call("ListTagsForResource", &ResourceArnInput { resource_arn: arn })
            .await?;
        Ok(out.tags.into_iter().map(|t| (t.key, t.value)).collect())
    }
}

#[async_trait]
impl VersionRegistry for HttpStateMachineApi {
    async fn list_versions(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<VersionListItem>> {
        let input = PagedArnInput {
            state_machine_arn,
            next_token,
        };
        let out: ListVersionsOutput = self
            .client
            .call("ListStateMachineVersions", &input)
            .await?;
        Ok(Page {
            items: out
                .state_machine_versions
                .into_iter()
                .map(|v| VersionListItem {
                    arn: v.state_machine_version_arn,
                    creation_date: v.creation_date.and_then(epoch_seconds),
                })
                .collect(),
            next_token: out.next_token,
        })
    }

    async fn delete_version(&self, version_arn: &str) -> Result<()> {
        let input = VersionArnInput {
            state_machine_version_arn: version_arn,
        };
        let _: Empty = self
            .client
            .call("DeleteStateMachineVersion", &input)
            .await?;
        Ok(())
    }

    async fn list_aliases(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<AliasListItem>> {
        let input = PagedArnInput {
            state_machine_arn,
            next_token,
        };
        let out: ListAliasesOutput = self
            .client
            .call("ListStateMachineAliases", &input)
            .await?;
        Ok(Page {
            items: out
                .state_machine_aliases
                .into_iter()
                .map(|a| AliasListItem {
                    arn: a.state_machine_alias_arn,
                    creation_date: a.creation_date.and_then(epoch_seconds),
                })
                .collect(),
            next_token: out.next_token,
        })
    }

    async fn describe_alias(&self, alias_arn: &str) -> Result<Alias> {
        let input = AliasArnInput {
            state_machine_alias_arn: alias_arn,
        };
        let out: DescribeAliasOutput = self
            .client
            .call("DescribeStateMachineAlias", &input)
            .await?;
        Ok(Alias {
            name: out.name,
            arn: out.state_machine_alias_arn,
            description: out.description,
            routing: out
                .routing_configuration
                .into_iter()
                .map(|r| RoutingEntry {
                    version_arn: r.state_machine_version_arn,
                    weight: r.weight,
                })
                .collect(),
            creation_date: out.creation_date.and_then(epoch_seconds),
            update_date: out.update_date.and_then(epoch_seconds),
        })
    }

    async fn create_alias(
        &self,
        name: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<String> {
        let input = CreateAliasInput {
            name,
            description,
            routing_configuration: wire_routing(routing),
        };
        let out: CreateAliasOutput = self
            .client
            .call("CreateStateMachineAlias", &input)
            .await?;
        Ok(out.state_machine_alias_arn)
    }

    async fn update_alias(
        &self,
        alias_arn: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<()> {
        let input = UpdateAliasInput {
            state_machine_alias_arn: alias_arn,
            description,
            routing_configuration: wire_routing(routing),
        };
        let _: Empty = self
            .client
            .call("UpdateStateMachineAlias", &input)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionControl for HttpStateMachineApi {
    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: &str,
        input: &str,
    ) -> Result<StartedExecution> {
        let request = StartExecutionInput {
            state_machine_arn,
            name,
            input,
        };
        let out: StartExecutionOutput = self.client.call("StartExecution", &request).await?;
        Ok(StartedExecution {
            execution_arn: out.execution_arn,
            start_date: out
                .start_date
                .and_then(epoch_seconds)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn stop_execution(&self, execution_arn: &str, error: &str, cause: &str) -> Result<()> {
        let input = StopExecutionInput {
            execution_arn,
            error,
            cause,
        };
        let _: Empty = self.client.call("StopExecution", &input).await?;
        Ok(())
    }

    async fn describe_execution(&self, execution_arn: &str) -> Result<Execution> {
        let input = ExecutionArnInput {
            execution_arn,
            next_token: None,
        };
        let out: DescribeExecutionOutput = self.client.call("DescribeExecution", &input).await?;
        let status = ExecutionStatus::from_service(&out.status).ok_or_else(|| {
            RemoteError::InvalidResponse(format!("unknown execution status {}", out.status))
        })?;
        Ok(Execution {
            execution_arn: out.execution_arn,
            name: out.name,
            status,
            start_date: out.start_date.and_then(epoch_seconds),
            stop_date: out.stop_date.and_then(epoch_seconds),
            output: out.output,
            error: out.error,
            cause: out.cause,
        })
    }

    async fn get_execution_history(
        &self,
        execution_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<HistoryEvent>> {
        let input = ExecutionArnInput {
            execution_arn,
            next_token,
        };
        let out: HistoryOutput = self.client.call("GetExecutionHistory", &input).await?;
        Ok(Page {
            items: out
                .events
                .into_iter()
                .map(|e| HistoryEvent {
                    id: e.id,
                    event_type: e.event_type,
                    timestamp: e.timestamp.and_then(epoch_seconds),
                })
                .collect(),
            next_token: out.next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARN: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:orders";

    async fn api(server: &MockServer) -> HttpStateMachineApi {
        HttpStateMachineApi::new(reqwest::Client::new(), server.uri())
    }

    #[tokio::test]
    async fn describe_state_machine_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-Amz-Target", "AWSStepFunctions.DescribeStateMachine"))
            .and(header("content-type", CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stateMachineArn": ARN,
                "name": "orders",
                "status": "ACTIVE",
                "definition": "{}",
                "roleArn": "arn:aws:iam::123456789012:role/sfn",
                "type": "STANDARD",
                "creationDate": 1_700_000_000.0,
                "loggingConfiguration": {
                    "level": "ERROR",
                    "includeExecutionData": true,
                    "destinations": [
                        {"cloudWatchLogsLogGroup": {"logGroupArn": "arn:aws:logs:group"}}
                    ]
                },
                "tracingConfiguration": {"enabled": true},
                "revisionId": "rev-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sm = api(&server).await.describe_state_machine(ARN).await.unwrap();

        assert_eq!(sm.name, "orders");
        assert!(sm.is_active());
        assert_eq!(sm.logging.level, LogLevel::Error);
        assert_eq!(sm.logging.destinations, vec!["arn:aws:logs:group"]);
        assert!(sm.tracing.enabled);
        assert_eq!(sm.revision_id.as_deref(), Some("rev-1"));
    }

    #[tokio::test]
    async fn describe_missing_state_machine_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "com.amazonaws.states#StateMachineDoesNotExist",
                "message": "State Machine Does Not Exist"
            })))
            .mount(&server)
            .await;

        let err = api(&server)
            .await
            .describe_state_machine(ARN)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_publishes_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSStepFunctions.CreateStateMachine"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "name": "orders",
                "publish": true,
                "tags": [{"key": "ManagedBy", "value": "stepctl"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stateMachineArn": ARN,
                "creationDate": 1_700_000_000.0,
                "stateMachineVersionArn": format!("{ARN}:1")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sm = StateMachine {
            name: "orders".into(),
            definition: "{}".into(),
            role_arn: "arn:aws:iam::123456789012:role/sfn".into(),
            tags: Tags::new().with_ownership(),
            ..Default::default()
        };
        let out = api(&server)
            .await
            .create_state_machine(&sm, None)
            .await
            .unwrap();

        assert_eq!(out.state_machine_arn, ARN);
        assert_eq!(out.version_arn, format!("{ARN}:1"));
    }

    #[tokio::test]
    async fn update_without_version_arn_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSStepFunctions.UpdateStateMachine"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"updateDate": 1_700_000_000.0})),
            )
            .mount(&server)
            .await;

        let err = api(&server)
            .await
            .update_state_machine(ARN, &StateMachine::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn describe_alias_maps_routing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(
                "X-Amz-Target",
                "AWSStepFunctions.DescribeStateMachineAlias",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stateMachineAliasArn": format!("{ARN}:current"),
                "name": "current",
                "routingConfiguration": [
                    {"stateMachineVersionArn": format!("{ARN}:3"), "weight": 100}
                ]
            })))
            .mount(&server)
            .await;

        let alias = api(&server)
            .await
            .describe_alias(&format!("{ARN}:current"))
            .await
            .unwrap();
        assert_eq!(alias.routing, vec![RoutingEntry::full(format!("{ARN}:3"))]);
    }

    #[tokio::test]
    async fn delete_version_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(
                "X-Amz-Target",
                "AWSStepFunctions.DeleteStateMachineVersion",
            ))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "com.amazonaws.states#ConflictException",
                "message": "Current list of aliases referencing this version: [current]"
            })))
            .mount(&server)
            .await;

        let err = api(&server)
            .await
            .delete_version(&format!("{ARN}:3"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(ref m) if m.contains("[current]")));
    }
}
