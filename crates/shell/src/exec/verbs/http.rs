use std::time::Duration;

use tracing::debug;

use crate::{
    error::{Error, Result},
    safety::validate_url,
    script::Verb,
};

use super::{VerbCtx, VerbOutput, arg, opt_arg};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        // Redirects could bounce to a host the sanitizer never saw.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::message(format!("http client: {e}")))
}

/// Read a response body up to `cap` bytes, marking truncation.
async fn capped_body(response: reqwest::Response, cap: usize) -> Result<String> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::message(format!("reading body: {e}")))?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.len() > cap {
        text.truncate(text.floor_char_boundary(cap));
        text.push_str("\n... [output truncated]");
    }
    Ok(text)
}

pub async fn run(verb: Verb, args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    match verb {
        Verb::HttpGet => {
            let url = validate_url(arg(args, 0, verb)?)?;
            debug!(%url, "http get");
            let response = client()?
                .get(url)
                .send()
                .await
                .map_err(|e| Error::message(format!("request failed: {e}")))?;
            let status = response.status();
            let body = capped_body(response, ctx.max_output_bytes).await?;
            if !status.is_success() {
                return Err(Error::message(format!("HTTP {status}: {body}")));
            }
            Ok(VerbOutput::text(body))
        },
        Verb::HttpHead => {
            let url = validate_url(arg(args, 0, verb)?)?;
            let response = client()?
                .head(url)
                .send()
                .await
                .map_err(|e| Error::message(format!("request failed: {e}")))?;
            let mut lines = vec![format!("{}", response.status())];
            for name in ["content-type", "content-length", "last-modified", "etag"] {
                if let Some(value) = response.headers().get(name)
                    && let Ok(value) = value.to_str()
                {
                    lines.push(format!("{name}: {value}"));
                }
            }
            Ok(VerbOutput::text(lines.join("\n")))
        },
        Verb::HttpPost => {
            let url = validate_url(arg(args, 0, verb)?)?;
            let body = arg(args, 1, verb)?.to_string();
            let content_type = opt_arg(args, 2).unwrap_or("application/json");
            debug!(%url, bytes = body.len(), "http post");
            let response = client()?
                .post(url)
                .header("content-type", content_type)
                .body(body)
                .send()
                .await
                .map_err(|e| Error::message(format!("request failed: {e}")))?;
            let status = response.status();
            let text = capped_body(response, ctx.max_output_bytes).await?;
            if !status.is_success() {
                return Err(Error::message(format!("HTTP {status}: {text}")));
            }
            Ok(VerbOutput::text(text))
        },
        Verb::HttpDownload => {
            let url = validate_url(arg(args, 0, verb)?)?;
            let path = ctx.resolve_write(arg(args, 1, verb)?)?;
            let response = client()?
                .get(url)
                .send()
                .await
                .map_err(|e| Error::message(format!("request failed: {e}")))?;
            if !response.status().is_success() {
                return Err(Error::message(format!("HTTP {}", response.status())));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::message(format!("reading body: {e}")))?;
            if bytes.len() > ctx.max_output_bytes {
                return Err(Error::message(format!(
                    "download of {} bytes exceeds the {} byte cap",
                    bytes.len(),
                    ctx.max_output_bytes
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &bytes)?;
            Ok(VerbOutput::text(bytes.len().to_string()))
        },
        other => Err(Error::message(format!("{other} is not an http verb"))),
    }
}
