// MIT License - Copyright (c) 2026 craftbot-link contributors

use std::collections::HashMap;

use crate::error::Result;
use crate::upload::{CraftbotLink, PostUploadAction, TransferProgress, UploadJob, UploadOutcome};

/// Common surface of every device upload backend.
///
/// The TCP console link implements this; HTTP-style links implement the
/// same surface on top of an [`HttpTransport`]. Process wiring picks the
/// implementation per device family and only ever talks to this trait.
#[allow(async_fn_in_trait)]
pub trait DeviceLink {
    /// Short human-readable backend name (e.g. shown in upload dialogs)
    fn name(&self) -> &'static str;

    fn can_test(&self) -> bool {
        true
    }

    /// Connectivity/readiness check without transferring anything.
    async fn test(&self) -> Result<()>;

    /// Post-actions this backend supports.
    fn post_upload_actions(&self) -> &'static [PostUploadAction] {
        &[PostUploadAction::None, PostUploadAction::StartPrint]
    }

    async fn upload(
        &self,
        job: &UploadJob,
        progress_fn: &mut dyn FnMut(&TransferProgress, &mut bool),
        error_fn: &mut dyn FnMut(&str),
        info_fn: &mut dyn FnMut(&str, &str),
    ) -> Result<UploadOutcome>;
}

impl DeviceLink for CraftbotLink {
    fn name(&self) -> &'static str {
        "CraftbotPlus"
    }

    async fn test(&self) -> Result<()> {
        CraftbotLink::test(self).await
    }

    async fn upload(
        &self,
        job: &UploadJob,
        progress_fn: &mut dyn FnMut(&TransferProgress, &mut bool),
        error_fn: &mut dyn FnMut(&str),
        info_fn: &mut dyn FnMut(&str, &str),
    ) -> Result<UploadOutcome> {
        CraftbotLink::upload(self, job, progress_fn, error_fn, info_fn).await
    }
}

/// HTTP verb of an [`HttpRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
}

/// Opaque request for the HTTP-based upload variant.
///
/// The core protocol never builds or inspects these; an external
/// [`HttpTransport`] performs them and reports back through the same sink
/// contracts the console link uses. All per-request configuration travels
/// here explicitly — there are no process-wide default headers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub verb: HttpVerb,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(verb: HttpVerb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Response produced by an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// External collaborator performing [`HttpRequest`]s.
///
/// Implementations call the progress sink throughout the body upload with
/// the same cancel semantics as the console link.
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn perform(
        &self,
        request: &HttpRequest,
        progress_fn: &mut dyn FnMut(&TransferProgress, &mut bool),
    ) -> Result<HttpResponse>;
}
