use super::{MossService, ReportHandle, Submission};
use crate::util::ensure_dir;
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_SERVER: &str = "moss.stanford.edu:7690";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for a single downloaded report page.
const MAX_PAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Client for the real MOSS service: submissions ride a line-oriented TCP
/// protocol, report pages come back over plain HTTP.
///
/// The user id is injected at construction so deep call paths never touch
/// the process environment.
pub struct MossClient {
    user_id: String,
    server: String,
    agent: ureq::Agent,
}

impl MossClient {
    pub fn new(user_id: String) -> Self {
        Self::with_server(user_id, DEFAULT_SERVER.to_string())
    }

    pub fn with_server(user_id: String, server: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build();
        Self {
            user_id,
            server,
            agent,
        }
    }

    fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let mut body = String::new();
        response
            .into_reader()
            .take(MAX_PAGE_BYTES)
            .read_to_string(&mut body)
            .with_context(|| format!("reading body of {url}"))?;
        Ok(body)
    }
}

impl MossService for MossClient {
    fn submit(&self, req: &Submission) -> Result<ReportHandle> {
        let stream = TcpStream::connect(&self.server)
            .with_context(|| format!("connecting to {}", self.server))?;
        let mut writer = stream
            .try_clone()
            .with_context(|| "cloning stream handle")?;
        let mut reader = BufReader::new(stream);

        let opts = &req.options;
        write!(
            writer,
            "moss {}\ndirectory {}\nX {}\nmaxmatches {}\nshow {}\nlanguage {}\n",
            self.user_id, opts.d, opts.x, opts.m, opts.n, req.lang
        )
        .with_context(|| "sending query header")?;

        let answer = read_line(&mut reader)?;
        if answer != "yes" {
            let _ = writer.write_all(b"end\n");
            bail!("language not accepted by server: {}", req.lang);
        }

        let total = req.base_files.len() + req.files.len();
        let mut sent = 0usize;
        for base in &req.base_files {
            // Base files keep their full path as the display name.
            upload_file(&mut writer, base, 0, &req.lang, &base.display().to_string())?;
            sent += 1;
            debug!("uploaded {sent}/{total}: {}", base.display());
        }
        for (index, (path, display_name)) in req.files.iter().enumerate() {
            upload_file(&mut writer, path, index + 1, &req.lang, display_name)?;
            sent += 1;
            debug!("uploaded {sent}/{total}: {display_name}");
        }

        write!(writer, "query 0 {}\n", opts.c).with_context(|| "sending query")?;
        info!("query sent; waiting for the server to process {total} files");

        let url = read_line(&mut reader)?;
        let _ = writer.write_all(b"end\n");
        if !url.starts_with("http") {
            bail!("unexpected server response: {url:?}");
        }
        Ok(ReportHandle(url))
    }

    fn fetch_summary(&self, handle: &ReportHandle, dest: &Path) -> Result<()> {
        let body = self.fetch_page(&handle.0)?;
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        std::fs::write(dest, body).with_context(|| format!("writing {}", dest.display()))?;
        Ok(())
    }

    fn fetch_report(&self, handle: &ReportHandle, dest: &Path, connections: usize) -> Result<()> {
        ensure_dir(dest)?;
        let base = handle.0.trim_end_matches('/').to_string();

        let index = self.fetch_page(&base)?;
        std::fs::write(dest.join("index.html"), localize_links(&index, &base))
            .with_context(|| "writing report index")?;

        let pages = match_pages(&index);
        debug!("report has {} match pages", pages.len());

        let cursor = AtomicUsize::new(0);
        let failures: Mutex<Vec<anyhow::Error>> = Mutex::new(Vec::new());
        let workers = connections.max(1).min(pages.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(page) = pages.get(i) else { break };
                        let result = self
                            .fetch_page(&format!("{base}/{page}"))
                            .and_then(|body| {
                                std::fs::write(dest.join(page), localize_links(&body, &base))
                                    .with_context(|| format!("writing {page}"))
                            });
                        if let Err(err) = result {
                            failures.lock().unwrap_or_else(|e| e.into_inner()).push(err);
                            break;
                        }
                    }
                });
            }
        });

        let mut failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
        if let Some(err) = failures.pop() {
            return Err(err.context("report download failed"));
        }
        Ok(())
    }
}

fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .with_context(|| "reading server response")?;
    if n == 0 {
        bail!("server closed the connection");
    }
    Ok(line.trim().to_string())
}

fn upload_file(
    writer: &mut impl Write,
    path: &Path,
    id: usize,
    lang: &str,
    display_name: &str,
) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading upload: {}", path.display()))?;
    // The wire format cannot carry spaces in names.
    let name = display_name.replace(' ', "_");
    write!(writer, "file {} {} {} {}\n", id, lang, bytes.len(), name)
        .with_context(|| format!("sending header for {name}"))?;
    writer
        .write_all(&bytes)
        .with_context(|| format!("sending contents of {name}"))?;
    Ok(())
}

/// Every page reachable from a report index: each `matchN.html` frame set
/// plus its `-top`, `-0` and `-1` panes.
fn match_pages(index: &str) -> Vec<String> {
    static MATCH_LINK: OnceLock<Regex> = OnceLock::new();
    let re = MATCH_LINK.get_or_init(|| Regex::new(r"match(\d+)\.html").unwrap_or_else(|_| unreachable!()));

    let mut numbers: Vec<u64> = re
        .captures_iter(index)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    numbers.sort_unstable();
    numbers.dedup();

    let mut pages = Vec::with_capacity(numbers.len() * 4);
    for n in numbers {
        pages.push(format!("match{n}.html"));
        pages.push(format!("match{n}-top.html"));
        pages.push(format!("match{n}-0.html"));
        pages.push(format!("match{n}-1.html"));
    }
    pages
}

/// Rewrite absolute report URLs to relative ones so a saved report browses
/// offline.
fn localize_links(body: &str, base: &str) -> String {
    body.replace(&format!("{base}/"), "")
}
