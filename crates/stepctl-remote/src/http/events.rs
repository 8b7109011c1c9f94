//! Event rule control plane over the AWS JSON 1.1 protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepctl_core::Tags;

use super::client::{AwsJsonClient, Empty};
use crate::error::Result;
use crate::events::{Rule, RuleTarget, TargetWriteOutcome, TriggerState};
use crate::paginate::Page;
use crate::ports::RuleApi;

const TARGET_PREFIX: &str = "AWSEvents";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// HTTP adapter for event rules.
#[derive(Debug, Clone)]
pub struct HttpRuleApi {
    client: AwsJsonClient,
}

impl HttpRuleApi {
    /// Create an adapter targeting `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client: AwsJsonClient::new(http, endpoint, TARGET_PREFIX, CONTENT_TYPE),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTag {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListRuleNamesByTargetInput<'a> {
    target_arn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRuleNamesByTargetOutput {
    #[serde(default)]
    rule_names: Vec<String>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NameInput<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeRuleOutput {
    name: String,
    arn: Option<String>,
    description: Option<String>,
    event_bus_name: Option<String>,
    event_pattern: Option<String>,
    schedule_expression: Option<String>,
    role_arn: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRuleInput<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_bus_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_pattern: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule_expression: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_arn: Option<&'a str>,
    state: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRuleOutput {
    rule_arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListTargetsInput<'a> {
    rule: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTarget {
    id: String,
    arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<String>,
}

impl From<&RuleTarget> for WireTarget {
    fn from(t: &RuleTarget) -> Self {
        Self {
            id: t.id.clone(),
            arn: t.arn.clone(),
            role_arn: t.role_arn.clone(),
            input: t.input.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTargetsOutput {
    #[serde(default)]
    targets: Vec<WireTarget>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutTargetsInput<'a> {
    rule: &'a str,
    targets: Vec<WireTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RemoveTargetsInput<'a> {
    rule: &'a str,
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetsOutput {
    #[serde(default)]
    failed_entry_count: u32,
    #[serde(default)]
    failed_entries: Vec<WireFailedEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireFailedEntry {
    target_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

impl From<TargetsOutput> for TargetWriteOutcome {
    fn from(out: TargetsOutput) -> Self {
        Self {
            failed_entry_count: out.failed_entry_count,
            failed_entries: out
                .failed_entries
                .into_iter()
                .map(|e| {
                    format!(
                        "{}: {} {}",
                        e.target_id.unwrap_or_default(),
                        e.error_code.unwrap_or_default(),
                        e.error_message.unwrap_or_default()
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResourceArnInput<'a> {
    #[serde(rename = "ResourceARN")]
    resource_arn: &'a str,
}

#[derive(Debug, Serialize)]
struct TagResourceInput<'a> {
    #[serde(rename = "ResourceARN")]
    resource_arn: &'a str,
    #[serde(rename = "Tags")]
    tags: Vec<WireTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTagsOutput {
    #[serde(default)]
    tags: Vec<WireTag>,
}

#[async_trait]
impl RuleApi for HttpRuleApi {
    async fn list_rule_names_by_target(
        &self,
        target_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        let input = ListRuleNamesByTargetInput {
            target_arn,
            next_token,
        };
        let out: ListRuleNamesByTargetOutput =
            self.client.call("ListRuleNamesByTarget", &input).await?;
        Ok(Page {
            items: out.rule_names,
            next_token: out.next_token,
        })
    }

    async fn describe_rule(&self, name: &str) -> Result<Rule> {
        let out: DescribeRuleOutput = self.client.call("DescribeRule", &NameInput { name }).await?;
        Ok(Rule {
            name: out.name,
            arn: out.arn,
            description: out.description,
            event_bus_name: out.event_bus_name,
            event_pattern: out.event_pattern,
            schedule_expression: out.schedule_expression,
            role_arn: out.role_arn,
            state: out
                .state
                .as_deref()
                .map(TriggerState::from_service)
                .unwrap_or_default(),
            targets: Vec::new(),
            tags: Tags::new(),
        })
    }

    async fn put_rule(&self, rule: &Rule) -> Result<String> {
        let input = PutRuleInput {
            name: &rule.name,
            description: rule.description.as_deref(),
            event_bus_name: rule.event_bus_name.as_deref(),
            event_pattern: rule.event_pattern.as_deref(),
            schedule_expression: rule.schedule_expression.as_deref(),
            role_arn: rule.role_arn.as_deref(),
            state: rule.state.as_str(),
        };
        let out: PutRuleOutput = self.client.call("PutRule", &input).await?;
        Ok(out.rule_arn)
    }

    async fn delete_rule(&self, name: &str) -> Result<()> {
        let _: Empty = self.client.call("DeleteRule", &NameInput { name }).await?;
        Ok(())
    }

    async fn list_targets_by_rule(
        &self,
        name: &str,
        next_token: Option<String>,
    ) -> Result<Page<RuleTarget>> {
        let input = ListTargetsInput {
            rule: name,
            next_token,
        };
        let out: ListTargetsOutput = self.client.call("ListTargetsByRule", &input).await?;
        Ok(Page {
            items: out
                .targets
                .into_iter()
                .map(|t| RuleTarget {
                    id: t.id,
                    arn: t.arn,
                    role_arn: t.role_arn,
                    input: t.input,
                })
                .collect(),
            next_token: out.next_token,
        })
    }

    async fn put_targets(&self, name: &str, targets: &[RuleTarget]) -> Result<TargetWriteOutcome> {
        let input = PutTargetsInput {
            rule: name,
            targets: targets.iter().map(WireTarget::from).collect(),
        };
        let out: TargetsOutput = self.client.call("PutTargets", &input).await?;
        Ok(out.into())
    }

    async fn remove_targets(&self, name: &str, ids: &[String]) -> Result<TargetWriteOutcome> {
        let input = RemoveTargetsInput { rule: name, ids };
        let out: TargetsOutput = self.client.call("RemoveTargets", &input).await?;
        Ok(out.into())
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        let out: ListTagsOutput = self
            .client
            .call("ListTagsForResource", &ResourceArnInput { resource_arn: arn })
            .await?;
        Ok(out.tags.into_iter().map(|t| (t.key, t.value)).collect())
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let input = TagResourceInput {
            resource_arn: arn,
            tags: tags
                .iter()
                .map(|t| WireTag {
                    key: t.key.clone(),
                    value: t.value.clone(),
                })
                .collect(),
        };
        let _: Empty = self.client.call("TagResource", &input).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn put_targets_reports_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSEvents.PutTargets"))
            .and(body_partial_json(serde_json::json!({"Rule": "nightly"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "FailedEntryCount": 1,
                "FailedEntries": [
                    {"TargetId": "t1", "ErrorCode": "ValidationException", "ErrorMessage": "bad role"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpRuleApi::new(reqwest::Client::new(), server.uri());
        let outcome = api
            .put_targets(
                "nightly",
                &[RuleTarget {
                    id: "t1".into(),
                    arn: "arn:target".into(),
                    role_arn: None,
                    input: None,
                }],
            )
            .await
            .unwrap();

        assert_eq!(outcome.failed_entry_count, 1);
        assert!(outcome.failed_entries[0].contains("bad role"));
    }

    #[tokio::test]
    async fn describe_rule_parses_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSEvents.DescribeRule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Name": "nightly",
                "Arn": "arn:aws:events:us-east-1:1:rule/nightly",
                "ScheduleExpression": "rate(1 day)",
                "State": "DISABLED"
            })))
            .mount(&server)
            .await;

        let api = HttpRuleApi::new(reqwest::Client::new(), server.uri());
        let rule = api.describe_rule("nightly").await.unwrap();
        assert_eq!(rule.state, TriggerState::Disabled);
        assert_eq!(rule.schedule_expression.as_deref(), Some("rate(1 day)"));
    }

    #[tokio::test]
    async fn missing_rule_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "ResourceNotFoundException",
                "message": "Rule nightly does not exist"
            })))
            .mount(&server)
            .await;

        let api = HttpRuleApi::new(reqwest::Client::new(), server.uri());
        assert!(api.describe_rule("nightly").await.unwrap_err().is_not_found());
    }
}
