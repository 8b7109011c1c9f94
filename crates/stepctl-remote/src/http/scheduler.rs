//! Schedule control plane over the REST-JSON protocol.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use stepctl_core::Tags;

use super::client::{Empty, RestJsonClient};
use crate::error::Result;
use crate::events::{FlexibleTimeWindow, Schedule, ScheduleSummary, ScheduleTarget, TriggerState};
use crate::paginate::Page;
use crate::ports::ScheduleApi;

/// HTTP adapter for schedules.
#[derive(Debug, Clone)]
pub struct HttpScheduleApi {
    client: RestJsonClient,
}

impl HttpScheduleApi {
    /// Create an adapter targeting `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client: RestJsonClient::new(http, endpoint),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTag {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListSchedulesOutput {
    #[serde(default)]
    schedules: Vec<WireScheduleSummary>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireScheduleSummary {
    name: String,
    group_name: Option<String>,
    arn: String,
    state: Option<String>,
    target: Option<WireTargetSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTargetSummary {
    arn: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireWindow {
    mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum_window_in_minutes: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTarget {
    arn: String,
    role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetScheduleOutput {
    name: String,
    group_name: Option<String>,
    arn: Option<String>,
    description: Option<String>,
    schedule_expression: String,
    schedule_expression_timezone: Option<String>,
    #[serde(default)]
    flexible_time_window: WireWindow,
    state: Option<String>,
    #[serde(default)]
    target: WireTarget,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WriteScheduleInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    group_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    schedule_expression: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule_expression_timezone: Option<&'a str>,
    flexible_time_window: WireWindow,
    state: &'static str,
    target: WireTarget,
}

impl<'a> From<&'a Schedule> for WriteScheduleInput<'a> {
    fn from(s: &'a Schedule) -> Self {
        Self {
            group_name: s.group_name.as_deref(),
            description: s.description.as_deref(),
            schedule_expression: &s.schedule_expression,
            schedule_expression_timezone: s.schedule_expression_timezone.as_deref(),
            flexible_time_window: WireWindow {
                mode: s.flexible_time_window.mode.clone(),
                maximum_window_in_minutes: s.flexible_time_window.maximum_window_in_minutes,
            },
            state: s.state.as_str(),
            target: WireTarget {
                arn: s.target.arn.clone(),
                role_arn: s.target.role_arn.clone(),
                input: s.target.input.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WriteScheduleOutput {
    schedule_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTagsOutput {
    #[serde(default)]
    tags: Vec<WireTag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TagResourceInput {
    tags: Vec<WireTag>,
}

fn group_query(group_name: Option<&str>) -> Vec<(&str, &str)> {
    group_name.map(|g| ("groupName", g)).into_iter().collect()
}

#[async_trait]
impl ScheduleApi for HttpScheduleApi {
    async fn list_schedules(&self, next_token: Option<String>) -> Result<Page<ScheduleSummary>> {
        let query: Vec<(&str, &str)> = next_token
            .as_deref()
            .map(|t| ("NextToken", t))
            .into_iter()
            .collect();
        let out: ListSchedulesOutput = self
            .client
            .request::<(), _>(Method::GET, &["schedules"], &query, None)
            .await?;
        Ok(Page {
            items: out
                .schedules
                .into_iter()
                .map(|s| ScheduleSummary {
                    name: s.name,
                    group_name: s.group_name,
                    arn: s.arn,
                    target_arn: s.target.map(|t| t.arn).unwrap_or_default(),
                    state: s
                        .state
                        .as_deref()
                        .map(TriggerState::from_service)
                        .unwrap_or_default(),
                })
                .collect(),
            next_token: out.next_token,
        })
    }

    async fn get_schedule(&self, group_name: Option<&str>, name: &str) -> Result<Schedule> {
        let out: GetScheduleOutput = self
            .client
            .request::<(), _>(
                Method::GET,
                &["schedules", name],
                &group_query(group_name),
                None,
            )
            .await?;
        Ok(Schedule {
            name: out.name,
            group_name: out.group_name,
            arn: out.arn,
            description: out.description,
            schedule_expression: out.schedule_expression,
            schedule_expression_timezone: out.schedule_expression_timezone,
            flexible_time_window: FlexibleTimeWindow {
                mode: out.flexible_time_window.mode,
                maximum_window_in_minutes: out.flexible_time_window.maximum_window_in_minutes,
            },
            state: out
                .state
                .as_deref()
                .map(TriggerState::from_service)
                .unwrap_or_default(),
            target: ScheduleTarget {
                arn: out.target.arn,
                role_arn: out.target.role_arn,
                input: out.target.input,
            },
            tags: Tags::new(),
        })
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String> {
        let body = WriteScheduleInput::from(schedule);
        let out: WriteScheduleOutput = self
            .client
            .request(Method::POST, &["schedules", &schedule.name], &[], Some(&body))
            .await?;
        Ok(out.schedule_arn)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<String> {
        let body = WriteScheduleInput::from(schedule);
        let out: WriteScheduleOutput = self
            .client
            .request(Method::PUT, &["schedules", &schedule.name], &[], Some(&body))
            .await?;
        Ok(out.schedule_arn)
    }

    async fn delete_schedule(&self, group_name: Option<&str>, name: &str) -> Result<()> {
        let _: Empty = self
            .client
            .request::<(), _>(
                Method::DELETE,
                &["schedules", name],
                &group_query(group_name),
                None,
            )
            .await?;
        Ok(())
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        let out: ListTagsOutput = self
            .client
            .request::<(), _>(Method::GET, &["tags", arn], &[], None)
            .await?;
        Ok(out.tags.into_iter().map(|t| (t.key, t.value)).collect())
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let body = TagResourceInput {
            tags: tags
                .iter()
                .map(|t| WireTag {
                    key: t.key.clone(),
                    value: t.value.clone(),
                })
                .collect(),
        };
        let _: Empty = self
            .client
            .request(Method::POST, &["tags", arn], &[], Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_schedule_with_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedules/nightly"))
            .and(query_param("groupName", "jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Name": "nightly",
                "GroupName": "jobs",
                "Arn": "arn:aws:scheduler:us-east-1:1:schedule/jobs/nightly",
                "ScheduleExpression": "cron(0 3 * * ? *)",
                "FlexibleTimeWindow": {"Mode": "OFF"},
                "State": "DISABLED",
                "Target": {"Arn": "arn:sfn:current", "RoleArn": "arn:role"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpScheduleApi::new(reqwest::Client::new(), server.uri());
        let schedule = api.get_schedule(Some("jobs"), "nightly").await.unwrap();

        assert_eq!(schedule.state, TriggerState::Disabled);
        assert_eq!(schedule.target.arn, "arn:sfn:current");
        assert_eq!(schedule.flexible_time_window, FlexibleTimeWindow::off());
    }

    #[tokio::test]
    async fn list_schedules_follows_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedules"))
            .and(query_param("NextToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Schedules": [{
                    "Name": "b", "Arn": "arn:b", "State": "ENABLED",
                    "Target": {"Arn": "arn:sfn:current"}
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Schedules": [{
                    "Name": "a", "Arn": "arn:a", "State": "ENABLED",
                    "Target": {"Arn": "arn:other"}
                }],
                "NextToken": "p2"
            })))
            .mount(&server)
            .await;

        let api = HttpScheduleApi::new(reqwest::Client::new(), server.uri());
        let all = crate::paginate::collect_all(|token| api.list_schedules(token))
            .await
            .unwrap();

        let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(all[1].target_arn, "arn:sfn:current");
    }

    #[tokio::test]
    async fn not_found_from_error_header() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("x-amzn-ErrorType", "ResourceNotFoundException")
                    .set_body_json(serde_json::json!({"Message": "Schedule nightly does not exist."})),
            )
            .mount(&server)
            .await;

        let api = HttpScheduleApi::new(reqwest::Client::new(), server.uri());
        let err = api.delete_schedule(None, "nightly").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
