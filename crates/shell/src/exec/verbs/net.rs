use std::{net::IpAddr, time::Duration};

use tracing::debug;

use crate::{
    error::{Error, Result},
    safety::{is_private_ip, validate_hostname, validate_url},
    script::Verb,
};

use super::{VerbOutput, arg};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    match verb {
        Verb::DnsResolve => dns_resolve(arg(args, 0, verb)?).await,
        Verb::PortCheck => port_check(arg(args, 0, verb)?, arg(args, 1, verb)?).await,
        Verb::HttpPing => http_ping(arg(args, 0, verb)?).await,
        other => Err(Error::message(format!("{other} is not a network verb"))),
    }
}

/// Resolve a hostname. Private and reserved addresses are filtered from the
/// output — the agent only ever sees public address space.
async fn dns_resolve(host: &str) -> Result<VerbOutput> {
    validate_hostname(host)?;
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| Error::message(format!("resolve {host:?}: {e}")))?;

    let mut public: Vec<String> = Vec::new();
    let mut filtered = 0usize;
    for addr in addrs {
        let ip: IpAddr = addr.ip();
        if is_private_ip(&ip) {
            filtered += 1;
        } else {
            public.push(ip.to_string());
        }
    }
    public.sort();
    public.dedup();
    debug!(host, public = public.len(), filtered, "dns resolve");

    let mut out = public.join("\n");
    if filtered > 0 {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{filtered} private address(es) withheld]"));
    }
    Ok(VerbOutput::text(out))
}

/// TCP reachability probe. Same host discipline as the URL sanitizer and
/// the same port closure: 80 or 443 only.
async fn port_check(host: &str, port_raw: &str) -> Result<VerbOutput> {
    validate_hostname(host)?;
    let port: u16 = port_raw
        .parse()
        .map_err(|_| Error::message(format!("bad port {port_raw:?}")))?;
    if port != 80 && port != 443 {
        return Err(Error::url_violation(
            format!("{host}:{port}"),
            "only ports 80 and 443 may be probed",
        ));
    }
    let started = std::time::Instant::now();
    let connect = tokio::net::TcpStream::connect((host, port));
    let result = tokio::time::timeout(CONNECT_TIMEOUT, connect).await;
    let out = match result {
        Ok(Ok(_)) => format!("open ({} ms)", started.elapsed().as_millis()),
        Ok(Err(e)) => format!("closed: {e}"),
        Err(_) => "timeout".to_string(),
    };
    Ok(VerbOutput::text(out))
}

/// HEAD request latency through the full URL sanitizer.
async fn http_ping(raw: &str) -> Result<VerbOutput> {
    let url = validate_url(raw)?;
    let client = reqwest::Client::builder()
        .timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::message(format!("http client: {e}")))?;
    let started = std::time::Instant::now();
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| Error::message(format!("ping failed: {e}")))?;
    Ok(VerbOutput::text(format!(
        "{} ({} ms)",
        response.status().as_u16(),
        started.elapsed().as_millis()
    )))
}
