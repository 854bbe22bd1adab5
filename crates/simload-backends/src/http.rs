use reqwest::Response;
use serde::de::DeserializeOwned;
use simload_core::{CoreError, CoreResult};

const MAX_ERROR_BODY: usize = 512;

pub(crate) fn transport(err: reqwest::Error) -> CoreError {
    CoreError::Transport(err.to_string())
}

/// Passes successful responses through and turns the rest into
/// [`CoreError::UnexpectedStatus`] carrying a truncated body.
pub(crate) async fn check_status(response: Response) -> CoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CoreError::UnexpectedStatus {
        status: status.as_u16(),
        body: truncate(body),
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> CoreResult<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::MalformedResponse(e.to_string()))
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
