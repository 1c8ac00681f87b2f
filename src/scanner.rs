use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::domain::MetadataRecord;
use crate::error::RefgetError;
use crate::fs_util;
use crate::window::Window;

pub const CHUNK_SIZE: usize = 8192;
pub const LIST_HEADER: &str = "Accession\tURL\n";
pub const FLATFILE_LABEL: &str = "WGS_SET_FLATFILE";

static RECORD_RE: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(r"(?s)<ASSEMBLY[\s>].*?</ASSEMBLY>").expect("valid regex"));
static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"accession="([^"]+)""#).expect("valid regex"));
static LINKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<ASSEMBLY_LINKS>(.*?)</ASSEMBLY_LINKS>").expect("valid regex")
});
static URL_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<URL_LINK>(.*?)</URL_LINK>").expect("valid regex"));
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<LABEL>\s*(.*?)\s*</LABEL>").expect("valid regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<URL>\s*(.*?)\s*</URL>").expect("valid regex"));

pub trait SearchClient: Send + Sync {
    fn search(&self, query: &str) -> Result<Box<dyn Read + Send>, RefgetError>;
}

#[derive(Clone)]
pub struct EnaSearchHttpClient {
    client: Client,
    search_url: String,
}

impl EnaSearchHttpClient {
    pub fn new(search_url: impl Into<String>) -> Result<Self, RefgetError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("refget-loader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RefgetError::Transport(err.to_string()))?,
        );

        // Search responses for busy days stream for minutes; only bound the connect.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| RefgetError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            search_url: search_url.into(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, RefgetError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        warn!(status, attempt, "search endpoint busy, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        warn!(error = %err, attempt, "search request failed, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(RefgetError::Transport(err.to_string()));
                }
            }
        }
    }
}

impl SearchClient for EnaSearchHttpClient {
    fn search(&self, query: &str) -> Result<Box<dyn Read + Send>, RefgetError> {
        let params = [
            ("result", "assembly"),
            ("query", query),
            ("fields", "accession"),
            ("display", "xml"),
        ];
        let response = self.send_with_retries(|| self.client.post(&self.search_url).form(&params))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "search request failed".to_string());
            return Err(RefgetError::TransportStatus { status, message });
        }
        Ok(Box::new(response))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Splits a streamed search response into complete `<ASSEMBLY>` blocks.
///
/// Bytes are accumulated across reads; after each read every complete block
/// in the buffer is queued and the buffer is cut back to the unconsumed tail,
/// so a block split across reads is emitted exactly once.
pub struct RecordStream<R: Read> {
    reader: R,
    chunk: Vec<u8>,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<R: Read> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0; chunk_size.max(1)],
            buffer: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn drain_complete(&mut self) {
        let mut consumed = 0;
        for found in RECORD_RE.find_iter(&self.buffer) {
            self.ready
                .push_back(String::from_utf8_lossy(found.as_bytes()).into_owned());
            consumed = found.end();
        }
        self.buffer.drain(..consumed);
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<String, RefgetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }
            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    debug!(bytes = self.buffer.len(), "discarding bytes after last record");
                    self.finished = true;
                }
                Ok(read) => {
                    self.buffer.extend_from_slice(&self.chunk[..read]);
                    self.drain_complete();
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(RefgetError::Transport(err.to_string())));
                }
            }
        }
    }
}

pub fn parse_record(xml: &str) -> Result<MetadataRecord, RefgetError> {
    let accession = ACCESSION_RE
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| RefgetError::MalformedRecord("missing accession attribute".to_string()))?;

    let mut url = None;
    for links in LINKS_RE.captures_iter(xml) {
        for link in URL_LINK_RE.captures_iter(&links[1]) {
            let body = &link[1];
            let label = LABEL_RE.captures(body).map(|caps| caps[1].to_string());
            if label.as_deref() == Some(FLATFILE_LABEL) {
                if let Some(caps) = URL_RE.captures(body) {
                    url = Some(unescape_xml(&caps[1]));
                }
            }
        }
    }

    let url = url.ok_or_else(|| {
        RefgetError::MalformedRecord(format!("{accession} has no {FLATFILE_LABEL} link"))
    })?;
    Ok(MetadataRecord::new(accession, url))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub struct AssemblyScanner<C: SearchClient> {
    client: C,
    chunk_size: usize,
}

impl<C: SearchClient> AssemblyScanner<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(client: C, chunk_size: usize) -> Self {
        Self { client, chunk_size }
    }

    pub fn records<W: Window>(
        &self,
        window: &W,
    ) -> Result<RecordStream<Box<dyn Read + Send>>, RefgetError> {
        let query = window.search_query()?;
        debug!(%window, query, "querying search endpoint");
        let body = self.client.search(&query)?;
        Ok(RecordStream::with_chunk_size(body, self.chunk_size))
    }

    /// `list_path` only appears once the scan has finished. Returns the number
    /// of rows written.
    pub fn generate_list<W: Window>(
        &self,
        window: &W,
        list_path: &Utf8Path,
    ) -> Result<usize, RefgetError> {
        let mut temp = fs_util::temp_sibling(list_path)?;
        temp.write_all(LIST_HEADER.as_bytes())
            .map_err(|err| RefgetError::Filesystem(err.to_string()))?;

        let mut written = 0usize;
        for xml in self.records(window)? {
            let xml = xml?;
            match parse_record(&xml) {
                Ok(record) => {
                    temp.write_all(record.to_list_row().as_bytes())
                        .map_err(|err| RefgetError::Filesystem(err.to_string()))?;
                    written += 1;
                }
                Err(err) => debug!(error = %err, "skipping record"),
            }
        }

        fs_util::persist_atomic(temp, list_path)?;
        info!(%window, records = written, path = %list_path, "wrote accession list");
        Ok(written)
    }
}

pub fn read_list(list_path: &Utf8Path) -> Result<Vec<MetadataRecord>, RefgetError> {
    let file = File::open(list_path.as_std_path())
        .map_err(|err| RefgetError::Filesystem(format!("open {list_path}: {err}")))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines().skip(1) {
        let line = line.map_err(|err| RefgetError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match MetadataRecord::from_list_row(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(error = %err, path = %list_path, "skipping list row"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_record_finds_flatfile_link() {
        let xml = r#"<ASSEMBLY accession="GCA_000001.1" alias="x">
  <ASSEMBLY_LINKS>
    <ASSEMBLY_LINK>
      <URL_LINK>
        <LABEL>WGS_SET_REPORT</LABEL>
        <URL>ftp://ftp.ebi.ac.uk/report.txt</URL>
      </URL_LINK>
    </ASSEMBLY_LINK>
    <ASSEMBLY_LINK>
      <URL_LINK>
        <LABEL>WGS_SET_FLATFILE</LABEL>
        <URL>ftp://ftp.ebi.ac.uk/pub/wgs/SPQE01.dat.gz</URL>
      </URL_LINK>
    </ASSEMBLY_LINK>
  </ASSEMBLY_LINKS>
</ASSEMBLY>"#;
        let record = parse_record(xml).unwrap();
        assert_eq!(record.identifier, "GCA_000001.1");
        assert_eq!(record.resource_url, "ftp://ftp.ebi.ac.uk/pub/wgs/SPQE01.dat.gz");
    }

    #[test]
    fn parse_record_without_flatfile_is_malformed() {
        let xml = r#"<ASSEMBLY accession="GCA_000002.1"><ASSEMBLY_LINKS></ASSEMBLY_LINKS></ASSEMBLY>"#;
        assert_matches!(parse_record(xml), Err(RefgetError::MalformedRecord(_)));
    }

    #[test]
    fn record_pattern_ignores_child_elements() {
        let stream = "<ROOT><ASSEMBLY_SET></ASSEMBLY_SET><ASSEMBLY accession=\"A\"><ASSEMBLY_LINKS/></ASSEMBLY></ROOT>";
        let records = RecordStream::new(stream.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].starts_with("<ASSEMBLY accession=\"A\""));
    }
}
