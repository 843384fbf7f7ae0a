//! # Sync Transport Client
//!
//! HTTP client a site uses to push and pull batches against a central
//! traceline server. Transport failures map onto
//! [`LineageError::Transport`], which is retriable: the site's marks only
//! advance on acknowledgement, so a failed transfer is simply resent.

use crate::api::{PullRequest, PullResponse, PushRequest, PushResponse, decode_batch, encode_batch};
use traceline_core::{IdMapping, LineageError, MergeReport, NodeId, Session, SyncBatch};

/// HTTP client for the central server's sync endpoints.
#[derive(Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    /// Create a client pointing at the central server's base URL.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, LineageError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LineageError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineageError::Transport(format!(
                "{url} returned {status}: {body}"
            )));
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| LineageError::Transport(format!("{url}: unreadable response: {e}")))
    }

    /// POST one batch to `/sync/push` and return the acknowledgement.
    pub async fn push(&self, batch: &SyncBatch) -> Result<(IdMapping, MergeReport), LineageError> {
        let request = PushRequest {
            batch: encode_batch(batch)?,
        };
        let response: PushResponse = self.post_json("/sync/push", &request).await?;
        Ok((response.id_mapping(), response.report))
    }

    /// POST `/sync/pull` and return the batch the server collected. With an
    /// execution origin key, the server collects just that run.
    pub async fn pull(
        &self,
        pipeline: &str,
        since: u64,
        execution: Option<NodeId>,
    ) -> Result<SyncBatch, LineageError> {
        let request = PullRequest {
            pipeline: pipeline.to_string(),
            since,
            execution,
        };
        let response: PullResponse = self.post_json("/sync/pull", &request).await?;
        decode_batch(&response.batch)
    }
}

// =============================================================================
// SYNC DRIVERS
// =============================================================================

/// Push one pipeline end to end: collect, transfer, acknowledge.
///
/// Returns `None` when the pipeline was already clean. On transport failure
/// the in-flight state is rolled back so the next attempt resends the same
/// batch; the central merge collapses anything that already landed.
pub async fn push_pipeline(
    session: &mut Session,
    client: &SyncClient,
    pipeline: &str,
) -> Result<Option<MergeReport>, LineageError> {
    let Some(batch) = session.begin_push(pipeline)? else {
        return Ok(None);
    };
    let high_mark = batch.high_mark;
    match client.push(&batch).await {
        Ok((mapping, report)) => {
            session.complete_push(pipeline, high_mark, &mapping)?;
            tracing::info!(
                pipeline,
                created = report.created(),
                conflicts = report.property_conflicts,
                "push acknowledged"
            );
            Ok(Some(report))
        }
        Err(e) => {
            session.abort_push(pipeline);
            Err(e)
        }
    }
}

/// Pull one pipeline end to end: request, transfer, merge.
pub async fn pull_pipeline(
    session: &mut Session,
    client: &SyncClient,
    pipeline: &str,
) -> Result<MergeReport, LineageError> {
    let since = session.begin_pull(pipeline)?;
    let result = match client.pull(pipeline, since, None).await {
        Ok(batch) => session.complete_pull(&batch),
        Err(e) => Err(e),
    };
    match result {
        Ok(report) => {
            tracing::info!(pipeline, created = report.created(), "pull applied");
            Ok(report)
        }
        Err(e) => {
            // Covers both transport failures and rejected batches; the graph
            // itself is untouched either way.
            session.abort_pull(pipeline);
            Err(e)
        }
    }
}

/// Pull a single execution by origin key and merge it locally.
///
/// This bypasses the pulled high-water mark on purpose: the batch covers one
/// run, not everything central wrote, so advancing the mark would make the
/// next full pull skip changes it never saw.
pub async fn pull_execution(
    session: &mut Session,
    client: &SyncClient,
    pipeline: &str,
    execution: NodeId,
) -> Result<MergeReport, LineageError> {
    let batch = client.pull(pipeline, 0, Some(execution)).await?;
    let report = session.merge_batch(&batch)?;
    tracing::info!(
        pipeline,
        execution = %execution,
        created = report.created(),
        "execution pull applied"
    );
    Ok(report)
}
