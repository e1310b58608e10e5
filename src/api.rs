use crate::{
    consts::{LOG_PAYLOAD_PREVIEW_CHARS, MAX_API_PAGE_LIMIT},
    core::truncate_message,
    error::NotifyError,
    model::{MarkAllReadWire, NotificationEvent, NotificationListWire, UnreadCountWire},
    settings::NotificationPreferences,
};

/// Thin client for the notification REST collaborator. Every call is a
/// black-box request against the backend; callers own retry and
/// reconciliation policy.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub(crate) fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.post(format!("{}{path}", self.base_url)))
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.put(format!("{}{path}", self.base_url)))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token.trim())),
            None => request,
        }
    }

    /// Fetch one page of notifications, newest first.
    pub(crate) async fn fetch_notifications(
        &self,
        limit: usize,
        offset: usize,
        unread_only: bool,
    ) -> Result<Vec<NotificationEvent>, NotifyError> {
        let limit = limit.min(MAX_API_PAGE_LIMIT);
        let mut endpoint = format!("/api/notifications?limit={limit}&offset={offset}");
        if unread_only {
            endpoint.push_str("&unread=true");
        }

        let response = self.get(&endpoint).send().await?;
        let response = check_status(response).await?;
        let page = response.json::<NotificationListWire>().await?;
        Ok(page.notifications)
    }

    pub(crate) async fn fetch_unread_count(&self) -> Result<u64, NotifyError> {
        let response = self.get("/api/notifications/unread-count").send().await?;
        let response = check_status(response).await?;
        let count = response.json::<UnreadCountWire>().await?;
        Ok(count.count)
    }

    /// Acknowledge one notification. Idempotent on the backend; safe to call
    /// twice for the same id.
    pub(crate) async fn mark_read(&self, event_id: &str) -> Result<(), NotifyError> {
        let response = self
            .post(&format!("/api/notifications/{event_id}/read"))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Acknowledge everything; returns the number of notifications affected.
    pub(crate) async fn mark_all_read(&self) -> Result<u64, NotifyError> {
        let response = self.post("/api/notifications/read-all").send().await?;
        let response = check_status(response).await?;
        let result = response.json::<MarkAllReadWire>().await?;
        Ok(result.affected)
    }

    pub(crate) async fn fetch_preferences(&self) -> Result<NotificationPreferences, NotifyError> {
        let response = self.get("/api/notifications/preferences").send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<NotificationPreferences>().await?)
    }

    pub(crate) async fn update_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<(), NotifyError> {
        let response = self
            .put("/api/notifications/preferences")
            .json(prefs)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read response body>".to_string());
    Err(NotifyError::Api {
        status,
        body: truncate_message(&body, LOG_PAYLOAD_PREVIEW_CHARS),
    })
}
