use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::SubmissionClient;
use super::error::{Result, SubmitError};
use super::store::SubmissionStore;
use super::transport::HttpTransport;
use crate::core::{
    CanonicalInvoice, CanonicalInvoiceBuilder, FieldMapping, InvoiceError, RawPayload, RecordId,
    Row, SubmissionFormat, SubmissionRecord, TransmissionStatus, group_rows,
};
use crate::resource::to_resource_json;
use crate::transmission::to_transmission_xml;

/// Bounded fixed-interval retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay between consecutive attempts; none after the last.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    /// Six attempts, ten seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 6,
            interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// One attempt, no waiting.
    pub fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Blocking wait between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] that blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Raw input of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceInput {
    /// Spreadsheet rows sharing one invoice identifier.
    Rows(Vec<Row>),
    /// A single JSON invoice object.
    Object(Value),
}

/// Drives a submission from raw input to a terminal status and keeps the
/// [`SubmissionRecord`] in step.
///
/// Records are only ever mutated here. Status and error report are
/// written together in one store update. Operations on the same record
/// are serialized from read to write, which also serializes the network
/// calls for its transmission reference.
pub struct CompletionTracker<T, S, Z = ThreadSleeper> {
    client: SubmissionClient<T>,
    store: S,
    sleeper: Z,
    builder: CanonicalInvoiceBuilder,
    report_retry: RetryPolicy,
    refresh_retry: RetryPolicy,
    locks: Mutex<HashMap<RecordId, Arc<Mutex<()>>>>,
}

impl<T: HttpTransport, S: SubmissionStore> CompletionTracker<T, S, ThreadSleeper> {
    /// Tracker with the default retry policies and a thread sleeper.
    pub fn new(client: SubmissionClient<T>, store: S) -> Self {
        let builder = CanonicalInvoiceBuilder::new(client.config().invoice_defaults());
        Self {
            client,
            store,
            sleeper: ThreadSleeper,
            builder,
            report_retry: RetryPolicy::default(),
            refresh_retry: RetryPolicy::single(),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: HttpTransport, S: SubmissionStore, Z: Sleeper> CompletionTracker<T, S, Z> {
    /// Replace the sleeper used between report fetch attempts.
    pub fn with_sleeper<Z2: Sleeper>(self, sleeper: Z2) -> CompletionTracker<T, S, Z2> {
        CompletionTracker {
            client: self.client,
            store: self.store,
            sleeper,
            builder: self.builder,
            report_retry: self.report_retry,
            refresh_retry: self.refresh_retry,
            locks: self.locks,
        }
    }

    /// Retry policy of the error report fetch right after submission.
    pub fn with_report_retry(mut self, policy: RetryPolicy) -> Self {
        self.report_retry = policy;
        self
    }

    /// Retry policy of the error report fetch on manual refresh.
    pub fn with_refresh_retry(mut self, policy: RetryPolicy) -> Self {
        self.refresh_retry = policy;
        self
    }

    pub fn client(&self) -> &SubmissionClient<T> {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Build, serialize, submit and poll one invoice.
    ///
    /// The record is persisted in SUBMITTED before the network call. A
    /// rejected submission leaves it there, with the backend body as raw
    /// response, and returns the rejection.
    pub fn submit(
        &self,
        input: InvoiceInput,
        format: SubmissionFormat,
        mapping: Option<&FieldMapping>,
    ) -> Result<SubmissionRecord> {
        let mut invoice = match &input {
            InvoiceInput::Rows(rows) => self.builder.from_rows(rows, mapping)?,
            InvoiceInput::Object(object) => self.builder.from_object(object, mapping)?,
        };
        if format == SubmissionFormat::Json {
            invoice.ensure_unique_suffix();
        }

        let (payload, raw_request) = serialize(&invoice, format)?;
        let mut record = self.store.create(SubmissionRecord {
            id: RecordId(0),
            identity: invoice.identity(),
            format,
            transmission_ref: None,
            status: TransmissionStatus::Submitted,
            backend_status: None,
            raw_request,
            raw_response: None,
            resource_link: None,
            error_report: None,
            invoice,
            created_at: Utc::now(),
        })?;
        info!(
            record = %record.id,
            invoice_gid = %record.invoice.invoice_gid(),
            %format,
            "submitting invoice"
        );

        self.with_record_lock(record.id, || {
            match self.send(&payload) {
                Ok(ack) => {
                    record.transmission_ref = ack.transmission_ref;
                    record.raw_response = Some(ack.raw_response);
                    record.resource_link = ack.resource_link;
                    self.store.update(&record)?;
                }
                Err(e) => {
                    if let SubmitError::SubmissionRejected { body, .. } = &e {
                        record.raw_response = Some(body.clone());
                        self.store.update(&record)?;
                    }
                    return Err(e);
                }
            }

            let polled = self.poll(&record, self.report_retry);
            self.store.update(&polled)?;
            Ok(polled)
        })
    }

    /// Split a table by invoice identifier and submit each group in turn.
    ///
    /// Earlier records for the same invoice xid are deleted before the
    /// group is submitted. Each group is submitted and polled before the
    /// next one starts.
    pub fn submit_batch(
        &self,
        rows: Vec<Row>,
        format: SubmissionFormat,
        mapping: Option<&FieldMapping>,
    ) -> Vec<(String, Result<SubmissionRecord>)> {
        group_rows(rows, mapping)
            .into_iter()
            .map(|(xid, group)| {
                let result = self
                    .replace_previous(&xid)
                    .and_then(|()| self.submit(InvoiceInput::Rows(group), format, mapping));
                if let Err(e) = &result {
                    warn!(invoice_xid = %xid, error = %e, "batch group failed");
                }
                (xid, result)
            })
            .collect()
    }

    /// Re-run the status check (and the report fetch, when the status is
    /// ERROR and no report is stored yet) without resubmitting.
    ///
    /// The record is only written when something changed.
    pub fn refresh_status(&self, id: RecordId) -> Result<SubmissionRecord> {
        self.with_record_lock(id, || {
            let record = self.get(id)?;
            let polled = self.poll(&record, self.refresh_retry);
            if polled != record {
                self.store.update(&polled)?;
            }
            Ok(polled)
        })
    }

    /// Post the stored payload again.
    ///
    /// On acceptance the record gets the new transmission reference, goes
    /// back to SUBMITTED and loses its error report. It is not polled.
    pub fn resend(&self, id: RecordId) -> Result<SubmissionRecord> {
        self.with_record_lock(id, || self.resend_locked(id))
    }

    /// The invoice resource behind a REST submission, as the backend
    /// holds it now.
    ///
    /// Fails with [`SubmitError::NotFound`] when the record has no
    /// resource link.
    pub fn fetch_resource(&self, id: RecordId) -> Result<Value> {
        let record = self.get(id)?;
        let gid = record.resource_gid().ok_or(SubmitError::NotFound(id))?;
        self.client.fetch_resource(gid)
    }

    /// Patch the invoice resource behind a REST submission.
    ///
    /// On success the patched fields are merged into the stored payload,
    /// so a later resend carries them, and the backend answer becomes the
    /// raw response. Status and transmission reference are unchanged.
    pub fn update_resource(&self, id: RecordId, patch: &Value) -> Result<SubmissionRecord> {
        self.with_record_lock(id, || {
            let mut record = self.get(id)?;
            let gid = record
                .resource_gid()
                .ok_or(SubmitError::NotFound(id))?
                .to_string();
            let updated = self.client.update_resource(&gid, patch)?;

            let mut document: Value =
                serde_json::from_str(&record.raw_request).map_err(InvoiceError::from)?;
            if let (Some(doc), Some(fields)) = (document.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            record.raw_request =
                serde_json::to_string_pretty(&document).map_err(InvoiceError::from)?;
            if let Some(body) = updated {
                record.raw_response = Some(body.to_string());
            }
            self.store.update(&record)?;
            info!(record = %id, %gid, "resource patched");
            Ok(record)
        })
    }

    fn resend_locked(&self, id: RecordId) -> Result<SubmissionRecord> {
        let mut record = self.get(id)?;
        let payload = match record.format {
            SubmissionFormat::Xml => Payload::Xml(record.raw_request.clone().into_bytes()),
            SubmissionFormat::Json => Payload::Json(
                serde_json::from_str(&record.raw_request).map_err(InvoiceError::from)?,
            ),
        };

        let ack = self.send(&payload)?;
        info!(
            record = %record.id,
            previous = record.transmission_ref.as_deref().unwrap_or(""),
            current = ack.transmission_ref.as_deref().unwrap_or(""),
            "invoice resent"
        );
        record.transmission_ref = ack.transmission_ref;
        record.raw_response = Some(ack.raw_response);
        if ack.resource_link.is_some() {
            record.resource_link = ack.resource_link;
        }
        record.status = TransmissionStatus::Submitted;
        record.backend_status = None;
        record.error_report = None;
        self.store.update(&record)?;
        Ok(record)
    }

    /// The stored payload in displayable form.
    pub fn raw_payload(&self, id: RecordId) -> Result<RawPayload> {
        let record = self.get(id)?;
        Ok(match record.format {
            SubmissionFormat::Xml => RawPayload::Xml(record.raw_request),
            SubmissionFormat::Json => RawPayload::Json(
                serde_json::from_str(&record.raw_request).map_err(InvoiceError::from)?,
            ),
        })
    }

    pub fn get(&self, id: RecordId) -> Result<SubmissionRecord> {
        self.store.get(id)?.ok_or(SubmitError::NotFound(id))
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<SubmissionRecord>> {
        self.store.list()
    }

    pub fn delete(&self, id: RecordId) -> Result<()> {
        if self.with_record_lock(id, || self.store.delete(id))? {
            info!(record = %id, "submission record deleted");
            Ok(())
        } else {
            Err(SubmitError::NotFound(id))
        }
    }

    fn replace_previous(&self, xid: &str) -> Result<()> {
        for old in self.store.find_by_invoice_xid(xid)? {
            debug!(record = %old.id, invoice_xid = %xid, "replacing previous submission");
            self.with_record_lock(old.id, || self.store.delete(old.id))?;
        }
        Ok(())
    }

    fn send(&self, payload: &Payload) -> Result<Ack> {
        match payload {
            Payload::Xml(bytes) => {
                let ack = self.client.submit_xml(bytes)?;
                Ok(Ack {
                    transmission_ref: ack.transmission_ref,
                    raw_response: ack.raw,
                    resource_link: None,
                })
            }
            Payload::Json(doc) => {
                let ack = self.client.submit_json(doc)?;
                Ok(Ack {
                    transmission_ref: ack.transmission_ref,
                    raw_response: ack.raw,
                    resource_link: ack.resource_link,
                })
            }
        }
    }

    /// Status check plus report fetch, returning the next state of the
    /// record. Failures of either query degrade into recorded state.
    fn poll(&self, record: &SubmissionRecord, report_retry: RetryPolicy) -> SubmissionRecord {
        let transmission_ref = record.transmission_ref.as_deref();
        let backend_status = match self.client.fetch_status(transmission_ref) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(record = %record.id, error = %e, "status query failed");
                None
            }
        };
        let status = backend_status
            .as_deref()
            .map_or(TransmissionStatus::Unknown, TransmissionStatus::from_backend);

        let error_report = match (status, &record.error_report) {
            (TransmissionStatus::Error, Some(existing)) => Some(existing.clone()),
            (TransmissionStatus::Error, None) => {
                self.fetch_report_with_retry(record.id, transmission_ref, report_retry)
            }
            _ => None,
        };

        let mut next = record.clone();
        next.status = status;
        next.backend_status = backend_status;
        next.error_report = error_report;
        next
    }

    fn fetch_report_with_retry(
        &self,
        id: RecordId,
        transmission_ref: Option<&str>,
        policy: RetryPolicy,
    ) -> Option<String> {
        for attempt in 1..=policy.max_attempts {
            match self.client.fetch_error_report(transmission_ref) {
                Ok(Some(report)) => {
                    info!(record = %id, attempt, "error report retrieved");
                    return Some(report);
                }
                Ok(None) => debug!(record = %id, attempt, "error log still empty"),
                Err(e) => warn!(record = %id, attempt, error = %e, "error log query failed"),
            }
            if attempt < policy.max_attempts {
                self.sleeper.sleep(policy.interval);
            }
        }
        let e = SubmitError::ErrorReportUnavailable {
            attempts: policy.max_attempts,
        };
        warn!(record = %id, error = %e, "keeping ERROR without report");
        None
    }

    /// Run `f` holding the lock of record `id`. The lock entry is dropped
    /// again once no other caller holds or waits for it.
    fn with_record_lock<R>(&self, id: RecordId, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(self.lock_map().entry(id).or_default());
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        let mut locks = self.lock_map();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        result
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<RecordId, Arc<Mutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.lock_map().len()
    }
}

enum Payload {
    Xml(Vec<u8>),
    Json(Value),
}

struct Ack {
    transmission_ref: Option<String>,
    raw_response: String,
    resource_link: Option<String>,
}

fn serialize(invoice: &CanonicalInvoice, format: SubmissionFormat) -> Result<(Payload, String)> {
    match format {
        SubmissionFormat::Xml => {
            let xml = to_transmission_xml(invoice)?;
            Ok((Payload::Xml(xml.bytes), xml.text))
        }
        SubmissionFormat::Json => {
            let doc = to_resource_json(invoice)?;
            let text = serde_json::to_string_pretty(&doc).map_err(InvoiceError::from)?;
            Ok((Payload::Json(doc), text))
        }
    }
}
