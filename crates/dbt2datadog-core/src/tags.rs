// Datadog tag context shared by every log record of one webhook event

use indexmap::IndexMap;

use crate::types::{ResourceKind, WebhookEvent};

const RESOURCE_TAG: &str = "resource";

/// Ordered `tag -> value` pairs, rendered as `key:value,key:value`.
///
/// Insertion order is fixed: project, environment, job, run, webhook,
/// run_reason, then `resource` once a kind has been selected. Re-selecting a
/// kind replaces the value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagContext {
    tags: IndexMap<&'static str, String>,
}

impl TagContext {
    pub fn from_event(event: &WebhookEvent) -> Self {
        let data = &event.data;
        let mut tags = IndexMap::with_capacity(7);
        tags.insert("project", data.project_name.clone());
        tags.insert("environment", data.environment_name.clone());
        tags.insert("job", data.job_name.clone());
        tags.insert("run", data.run_id.to_string());
        tags.insert("webhook", event.webhook_name.clone());
        tags.insert("run_reason", data.run_reason.clone());
        Self { tags }
    }

    pub fn set_resource(&mut self, kind: ResourceKind) {
        self.tags.insert(RESOURCE_TAG, kind.as_str().to_string());
    }

    pub fn render(&self) -> String {
        self.tags
            .iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}
