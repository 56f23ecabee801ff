//! In-memory engine for `mock://` URLs.
//!
//! The mock engine stands in for a real storage system in tests and in the
//! command-line tool. Its behavior is driven by URL query parameters:
//!
//! | Parameter        | Used by               | Meaning                                        |
//! |------------------|-----------------------|------------------------------------------------|
//! | `staging_time`   | bring-online          | seconds (fractional allowed) until the file is online |
//! | `staging_errno`  | bring-online          | errno reported once staging completes          |
//! | `release_errno`  | release               | errno reported by release                      |
//! | `abort_errno`    | abort                 | errno reported by abort                        |
//! | `size`           | copy source           | size of the synthetic source content           |
//! | `checksum`       | copy source/destination | checksum reported instead of the computed one |
//! | `transfer_time`  | copy source           | seconds the copy takes                         |
//! | `transfer_errno` | copy source           | errno the copy fails with once started        |
//!
//! Copy destinations are stored in memory and can be read back with
//! [`MockEngine::object`]. A destination's parent directory must exist: the
//! root always does, others are created with [`MockEngine::create_dir`] or by
//! a copy with `create_parent` set.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256, Sha512};
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, trace};
use url::Url;

use super::{
    BringOnlineRequest, CallbackSink, CopyRequest, Engine, StagingEngine, StagingReply,
    TokenBuffer, TokenRequest, TransferEngine,
};
use crate::context::CancelSignal;
use crate::error::EngineFault;
use crate::transfer::{
    ChecksumMode, Event, EventSide, ListenerHandle, Marker, TransferParams,
};

const DOMAIN: &str = "mock";
const SCHEME: &str = "mock";

/// Granularity of the synchronous bring-online wait.
const WAIT_STEP: Duration = Duration::from_millis(50);

/// Chunk size used for markers when no TCP buffer size is configured.
const DEFAULT_CHUNK: u64 = 64 * 1024;

/// Size of a synthetic source without a `size` parameter.
const DEFAULT_SOURCE_SIZE: u64 = 1024;

/// Domain of a source checksum mismatch found before the copy starts.
pub const CHECKSUM_SOURCE_DOMAIN: &str = "transfer.checksum.source";
/// Domain of a destination checksum mismatch against the expected value.
pub const CHECKSUM_DESTINATION_DOMAIN: &str = "transfer.checksum.destination";
/// Domain of a source/destination checksum disagreement.
pub const CHECKSUM_COMPARE_DOMAIN: &str = "transfer.checksum.compare";

/// Horizon standing in for deadlines too far away for the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Query parameters understood by the mock engine.
#[derive(Debug, Default, Clone, PartialEq)]
struct MockParams {
    staging_time: Duration,
    staging_errno: Option<i32>,
    release_errno: Option<i32>,
    abort_errno: Option<i32>,
    size: Option<u64>,
    checksum: Option<String>,
    transfer_time: Duration,
    transfer_errno: Option<i32>,
}

/// A parsed `mock://` URL.
#[derive(Debug, Clone)]
struct MockUrl {
    /// `host/path`, the storage key.
    key: String,
    params: MockParams,
}

impl MockUrl {
    fn parse(raw: &str) -> Result<Self, EngineFault> {
        let url = Url::parse(raw).map_err(|e| {
            EngineFault::new(libc::EINVAL, DOMAIN, format!("invalid URL {raw}: {e}"))
        })?;
        if url.scheme() != SCHEME {
            return Err(EngineFault::new(
                libc::EPROTONOSUPPORT,
                DOMAIN,
                format!("protocol not supported: {}", url.scheme()),
            ));
        }

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let params = MockParams {
            staging_time: seconds(&query, "staging_time")?,
            staging_errno: number(&query, "staging_errno")?,
            release_errno: number(&query, "release_errno")?,
            abort_errno: number(&query, "abort_errno")?,
            size: number(&query, "size")?,
            checksum: query.get("checksum").cloned(),
            transfer_time: seconds(&query, "transfer_time")?,
            transfer_errno: number(&query, "transfer_errno")?,
        };

        let path = match url.path() {
            "" => "/",
            path => path,
        };
        Ok(Self {
            key: format!("{}{}", url.host_str().unwrap_or_default(), path),
            params,
        })
    }

    /// Storage key of the parent directory, or `None` for the root.
    fn parent_key(&self) -> Option<&str> {
        parent_of(&self.key)
    }
}

fn parent_of(key: &str) -> Option<&str> {
    let (host, path) = key.split_once('/')?;
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.rfind('/')?;
    Some(&key[..host.len() + 1 + cut])
}

fn number<T: std::str::FromStr>(
    query: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, EngineFault> {
    query
        .get(name)
        .map(|value| {
            value.parse().map_err(|_| {
                EngineFault::new(libc::EINVAL, DOMAIN, format!("invalid {name}: {value}"))
            })
        })
        .transpose()
}

fn seconds(query: &HashMap<String, String>, name: &str) -> Result<Duration, EngineFault> {
    match number::<f64>(query, name)? {
        None => Ok(Duration::ZERO),
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            EngineFault::new(libc::EINVAL, DOMAIN, format!("invalid {name}: {secs}"))
        }),
    }
}

/// Deadline `span` after `start`, capped at [`FAR_FUTURE`] when the clock
/// cannot represent it.
fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

fn errno_fault(code: i32, domain: &str, what: &str) -> EngineFault {
    let reason = std::io::Error::from_raw_os_error(code);
    EngineFault::new(code, domain, format!("{what}: {reason}"))
}

/// Lifecycle of one staged URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Active,
    Released,
    Aborted,
}

#[derive(Debug, Clone)]
struct StagedFile {
    ready_at: Instant,
    /// Fault reported once staging completes; set immediately for URLs the
    /// engine refused.
    fault: Option<EngineFault>,
    release_errno: Option<i32>,
    abort_errno: Option<i32>,
    state: StageState,
}

impl StagedFile {
    fn refused(fault: EngineFault) -> Self {
        Self {
            ready_at: Instant::now(),
            fault: Some(fault),
            release_errno: None,
            abort_errno: None,
            state: StageState::Active,
        }
    }

    fn is_settled(&self, now: Instant) -> bool {
        self.state != StageState::Active || now >= self.ready_at
    }

    fn status(&self, now: Instant) -> Option<EngineFault> {
        match self.state {
            StageState::Released => Some(EngineFault::new(
                libc::EINVAL,
                DOMAIN,
                "staging request no longer active: pin released",
            )),
            StageState::Aborted => Some(EngineFault::new(
                libc::ECANCELED,
                DOMAIN,
                "staging request aborted",
            )),
            StageState::Active if now < self.ready_at => {
                Some(EngineFault::again(DOMAIN, "staging in progress"))
            }
            StageState::Active => self.fault.clone(),
        }
    }
}

/// Engine backed by in-memory state, addressed with `mock://` URLs.
#[derive(Debug, Default)]
pub struct MockEngine {
    staged: DashMap<(String, String), StagedFile>,
    objects: DashMap<String, Vec<u8>>,
    directories: DashSet<String>,
}

impl MockEngine {
    /// Creates an engine with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `url`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns a fault if `url` is not a valid `mock://` URL.
    pub fn put_object(&self, url: &str, data: impl Into<Vec<u8>>) -> Result<(), EngineFault> {
        let url = MockUrl::parse(url)?;
        self.objects.insert(url.key, data.into());
        Ok(())
    }

    /// Returns the content stored at `url`, if any.
    #[must_use]
    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        let url = MockUrl::parse(url).ok()?;
        self.objects.get(&url.key).map(|entry| entry.value().clone())
    }

    /// Creates the directory at `url` and its ancestors.
    ///
    /// # Errors
    ///
    /// Returns a fault if `url` is not a valid `mock://` URL.
    pub fn create_dir(&self, url: &str) -> Result<(), EngineFault> {
        let url = MockUrl::parse(url)?;
        self.make_dirs(url.key.trim_end_matches('/'));
        Ok(())
    }

    fn make_dirs(&self, key: &str) {
        let mut current = Some(key);
        while let Some(dir) = current {
            if !self.directories.insert(dir.to_string()) {
                break;
            }
            current = parent_of(dir);
        }
    }

    fn dir_exists(&self, key: &str) -> bool {
        !key.contains('/') || self.directories.contains(key)
    }

    /// Number of (token, URL) staging entries held.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    fn settled_statuses(
        &self,
        token: &str,
        urls: &[String],
        now: Instant,
    ) -> Vec<Option<EngineFault>> {
        urls.iter()
            .map(|url| match self.staged.get(&(token.to_string(), url.clone())) {
                Some(file) => file.status(now),
                None => Some(EngineFault::new(
                    libc::EINVAL,
                    DOMAIN,
                    format!("no staging request for {url} under token {token}"),
                )),
            })
            .collect()
    }

    fn all_settled(&self, token: &str, urls: &[String], now: Instant) -> bool {
        urls.iter().all(|url| {
            self.staged
                .get(&(token.to_string(), url.clone()))
                .is_none_or(|file| file.is_settled(now))
        })
    }

    fn none_settled(&self, token: &str, urls: &[String], now: Instant) -> bool {
        urls.iter().all(|url| {
            self.staged
                .get(&(token.to_string(), url.clone()))
                .is_some_and(|file| !file.is_settled(now))
        })
    }

    /// Latest instant at which one of the URLs becomes ready.
    fn latest_ready(&self, token: &str, urls: &[String]) -> Option<Instant> {
        urls.iter()
            .filter_map(|url| {
                self.staged
                    .get(&(token.to_string(), url.clone()))
                    .map(|file| file.ready_at)
            })
            .max()
    }

    fn mark_unsettled_aborted(&self, token: &str, urls: &[String], now: Instant) {
        for url in urls {
            if let Some(mut file) = self.staged.get_mut(&(token.to_string(), url.clone())) {
                if !file.is_settled(now) {
                    file.state = StageState::Aborted;
                }
            }
        }
    }

    /// Applies a release or abort to every URL, one status each.
    fn finish_requests(
        &self,
        request: &TokenRequest<'_>,
        errno: fn(&StagedFile) -> Option<i32>,
        state: StageState,
        what: &str,
    ) -> Vec<Option<EngineFault>> {
        request
            .urls
            .iter()
            .map(|url| {
                let key = (request.token.to_string(), url.clone());
                let Some(mut file) = self.staged.get_mut(&key) else {
                    return Some(EngineFault::new(
                        libc::EINVAL,
                        DOMAIN,
                        format!("no staging request for {url} under token {}", request.token),
                    ));
                };
                if let Some(code) = errno(&file) {
                    return Some(errno_fault(code, DOMAIN, what));
                }
                file.state = state;
                None
            })
            .collect()
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        DOMAIN
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}

#[async_trait]
impl StagingEngine for MockEngine {
    #[instrument(level = "debug", skip_all, fields(url_count = request.urls.len()))]
    async fn bring_online(
        &self,
        request: &BringOnlineRequest<'_>,
        token: &mut TokenBuffer,
    ) -> Result<StagingReply, EngineFault> {
        let issued = format!("mock-{:016x}", rand::random::<u64>());
        let submitted = Instant::now();

        for url in request.urls {
            let file = match MockUrl::parse(url) {
                Ok(parsed) => match submitted.checked_add(parsed.params.staging_time) {
                    Some(ready_at) => StagedFile {
                        ready_at,
                        fault: parsed
                            .params
                            .staging_errno
                            .map(|code| errno_fault(code, DOMAIN, "staging failed")),
                        release_errno: parsed.params.release_errno,
                        abort_errno: parsed.params.abort_errno,
                        state: StageState::Active,
                    },
                    None => StagedFile::refused(EngineFault::new(
                        libc::EINVAL,
                        DOMAIN,
                        format!(
                            "invalid staging_time: {}s",
                            parsed.params.staging_time.as_secs()
                        ),
                    )),
                },
                Err(fault) => StagedFile::refused(fault),
            };
            self.staged.insert((issued.clone(), url.clone()), file);
        }
        token.write(&issued);
        debug!(token = %issued, "staging request accepted");

        if request.asynchronous {
            let now = Instant::now();
            if self.none_settled(&issued, request.urls, now) {
                return Ok(StagingReply::queued(request.urls.len()));
            }
            return Ok(StagingReply::settled(self.settled_statuses(
                &issued,
                request.urls,
                now,
            )));
        }

        let deadline = deadline_after(submitted, Duration::from_secs(request.timeout_secs));
        loop {
            let now = Instant::now();
            if self.all_settled(&issued, request.urls, now) || now >= deadline {
                break;
            }
            if request.cancel.is_cancelled() {
                debug!(token = %issued, "bring-online cancelled while waiting");
                self.mark_unsettled_aborted(&issued, request.urls, now);
                break;
            }
            let until = self
                .latest_ready(&issued, request.urls)
                .map_or(deadline, |ready| ready.min(deadline));
            sleep(until.saturating_duration_since(now).min(WAIT_STEP)).await;
        }

        Ok(StagingReply::settled(self.settled_statuses(
            &issued,
            request.urls,
            Instant::now(),
        )))
    }

    async fn poll(&self, request: &TokenRequest<'_>) -> Result<StagingReply, EngineFault> {
        if request.cancel.is_cancelled() {
            return Err(EngineFault::cancelled(DOMAIN));
        }
        Ok(StagingReply::settled(self.settled_statuses(
            request.token,
            request.urls,
            Instant::now(),
        )))
    }

    async fn release(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault> {
        Ok(self.finish_requests(
            request,
            |file| file.release_errno,
            StageState::Released,
            "release failed",
        ))
    }

    async fn abort(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault> {
        Ok(self.finish_requests(
            request,
            |file| file.abort_errno,
            StageState::Aborted,
            "abort failed",
        ))
    }
}

/// Emits events and markers of one copy to every registered handle.
struct Reporter<'a> {
    sink: &'a dyn CallbackSink,
    event_handles: &'a [ListenerHandle],
    monitor_handles: &'a [ListenerHandle],
}

impl Reporter<'_> {
    fn event(&self, side: EventSide, stage: &str, description: impl Into<String>) {
        let event = Event::now(side, stage, DOMAIN, description);
        for handle in self.event_handles {
            self.sink.emit_event(*handle, &event);
        }
    }

    fn marker(&self, marker: &Marker) {
        for handle in self.monitor_handles {
            self.sink.emit_marker(*handle, marker);
        }
    }
}

/// Hex digest of `data` with a supported algorithm.
fn checksum(algorithm: &str, data: &[u8]) -> Result<String, EngineFault> {
    let digest = match algorithm.to_ascii_lowercase().as_str() {
        "sha256" => Sha256::digest(data).to_vec(),
        "sha512" => Sha512::digest(data).to_vec(),
        other => {
            return Err(EngineFault::new(
                libc::ENOTSUP,
                DOMAIN,
                format!("checksum algorithm not supported: {other}"),
            ));
        }
    };
    Ok(digest.iter().fold(String::with_capacity(digest.len() * 2), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    }))
}

#[allow(clippy::cast_possible_truncation)]
fn synthetic_content(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn throughput(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return bytes;
    }
    (bytes as f64 / secs) as u64
}

impl MockEngine {
    fn check_cancel(cancel: &CancelSignal) -> Result<(), EngineFault> {
        if cancel.is_cancelled() {
            return Err(EngineFault::cancelled("transfer"));
        }
        Ok(())
    }

    /// Validates the destination and prepares its parent. Returns true if an
    /// existing object is going to be replaced.
    fn prepare_destination(
        &self,
        destination: &MockUrl,
        params: &TransferParams,
    ) -> Result<bool, EngineFault> {
        let exists = self.objects.contains_key(&destination.key);
        if exists && !params.overwrite() {
            return Err(EngineFault::new(
                libc::EEXIST,
                "transfer.destination",
                format!("destination {} already exists", destination.key),
            ));
        }
        if let Some(parent) = destination.parent_key() {
            if !self.dir_exists(parent) {
                if !params.create_parent() {
                    return Err(EngineFault::new(
                        libc::ENOENT,
                        "transfer.destination",
                        format!("parent directory {parent} does not exist"),
                    ));
                }
                self.make_dirs(parent);
            }
        }
        Ok(exists)
    }

    /// Reported checksum of the source, honouring a `checksum` override.
    fn source_checksum(
        source: &MockUrl,
        data: &[u8],
        algorithm: &str,
    ) -> Result<String, EngineFault> {
        match &source.params.checksum {
            Some(forced) => Ok(forced.clone()),
            None => checksum(algorithm, data),
        }
    }

    async fn stream(
        &self,
        source: &MockUrl,
        data: &[u8],
        request: &CopyRequest<'_>,
        reporter: &Reporter<'_>,
    ) -> Result<(), EngineFault> {
        let params = request.params;
        let started = Instant::now();
        let deadline = deadline_after(started, params.timeout());
        let total = data.len() as u64;
        let chunk = match params.tcp_buffer_size() {
            0 => DEFAULT_CHUNK,
            size => size,
        };
        let chunks = total.div_ceil(chunk).max(1);
        let step = source.params.transfer_time / u32::try_from(chunks).unwrap_or(u32::MAX);

        let mut sent = 0;
        let mut last = started;
        while sent < total {
            Self::check_cancel(request.cancel)?;
            if !step.is_zero() {
                sleep(step).await;
            }
            let now = Instant::now();
            if now > deadline {
                return Err(EngineFault::new(
                    libc::ETIMEDOUT,
                    "transfer",
                    format!("transfer exceeded timeout of {}s", params.timeout().as_secs()),
                ));
            }
            let moved = chunk.min(total - sent);
            sent += moved;
            reporter.marker(&Marker {
                average_throughput: throughput(sent, now - started),
                instant_throughput: throughput(moved, now - last),
                bytes_transferred: sent,
                elapsed_time: now - started,
            });
            last = now;
            trace!(sent, total, "chunk transferred");
        }
        Ok(())
    }
}

#[async_trait]
impl TransferEngine for MockEngine {
    #[instrument(
        level = "debug",
        skip_all,
        fields(source = request.source, destination = request.destination)
    )]
    async fn copy(
        &self,
        request: &CopyRequest<'_>,
        sink: &dyn CallbackSink,
    ) -> Result<(), EngineFault> {
        let params = request.params;
        let reporter = Reporter {
            sink,
            event_handles: request.event_handles,
            monitor_handles: request.monitor_handles,
        };

        reporter.event(
            EventSide::None,
            "PREPARE_ENTER",
            format!("{} => {}", request.source, request.destination),
        );
        let source = MockUrl::parse(request.source)?;
        let destination = MockUrl::parse(request.destination)?;
        if params.nbstreams() == 0 {
            return Err(EngineFault::new(
                libc::EINVAL,
                "transfer",
                "number of streams must be at least 1",
            ));
        }
        Self::check_cancel(request.cancel)?;

        let data = self.objects.get(&source.key).map_or_else(
            || synthetic_content(source.params.size.unwrap_or(DEFAULT_SOURCE_SIZE)),
            |stored| stored.value().clone(),
        );

        let mode = params.checksum_mode();
        let validate = !params.strict_copy() && mode != ChecksumMode::None;
        let algorithm = params.checksum_algorithm();
        let expected = params.checksum_value();
        let mut source_sum = None;

        if validate {
            // Rejects unknown algorithms before anything else happens.
            checksum(algorithm, &[])?;
            if mode.validates_source() {
                reporter.event(EventSide::Source, "CHECKSUM_ENTER", algorithm);
                let sum = Self::source_checksum(&source, &data, algorithm)?;
                reporter.event(EventSide::Source, "CHECKSUM_EXIT", sum.clone());
                if let Some(expected) = expected {
                    if !sum.eq_ignore_ascii_case(expected) {
                        return Err(EngineFault::new(
                            libc::EIO,
                            CHECKSUM_SOURCE_DOMAIN,
                            format!("source checksum mismatch: expected {expected}, got {sum}"),
                        ));
                    }
                }
                source_sum = Some(sum);
            }
        } else if params.strict_copy() {
            debug!("strict copy, checksum validation skipped");
        }

        let replacing = self.prepare_destination(&destination, params)?;
        if replacing {
            reporter.event(
                EventSide::Destination,
                "OVERWRITE_DESTINATION",
                destination.key.clone(),
            );
        }
        reporter.event(EventSide::None, "PREPARE_EXIT", "");

        reporter.event(EventSide::None, "TRANSFER_ENTER", format!("{} bytes", data.len()));
        if let Some(code) = source.params.transfer_errno {
            return Err(errno_fault(code, "transfer", "transfer failed"));
        }
        self.stream(&source, &data, request, &reporter).await?;
        self.objects.insert(destination.key.clone(), data.clone());
        reporter.event(EventSide::None, "TRANSFER_EXIT", "");

        if validate && mode.validates_target() {
            reporter.event(EventSide::Destination, "CHECKSUM_ENTER", algorithm);
            let dest_sum = match &destination.params.checksum {
                Some(forced) => forced.clone(),
                None => checksum(algorithm, &data)?,
            };
            reporter.event(EventSide::Destination, "CHECKSUM_EXIT", dest_sum.clone());

            let mismatch = match expected {
                Some(expected) if !dest_sum.eq_ignore_ascii_case(expected) => Some((
                    CHECKSUM_DESTINATION_DOMAIN,
                    format!("destination checksum mismatch: expected {expected}, got {dest_sum}"),
                )),
                Some(_) => None,
                None => {
                    let src_sum = match source_sum {
                        Some(sum) => sum,
                        None => Self::source_checksum(&source, &data, algorithm)?,
                    };
                    (!dest_sum.eq_ignore_ascii_case(&src_sum)).then(|| {
                        (
                            CHECKSUM_COMPARE_DOMAIN,
                            format!("checksums differ: source {src_sum}, destination {dest_sum}"),
                        )
                    })
                }
            };
            if let Some((domain, message)) = mismatch {
                self.objects.remove(&destination.key);
                return Err(EngineFault::new(libc::EIO, domain, message));
            }
        }

        debug!(bytes = data.len(), "mock copy finished");
        Ok(())
    }
}
