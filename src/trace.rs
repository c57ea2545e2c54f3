//! Execution trace for replay verification.
//!
//! Records every executed event in dispatch order. Two runs of the same
//! script must produce traces with equal `trace_hash()` values; the text
//! export makes a mismatch easy to diff.

use std::io::{self, Write};

use crate::event::ExecutedEvent;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a variant).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

// ── Event Trace ───────────────────────────────────────────────────────

/// Append-only record of executed events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventTrace {
    entries: Vec<ExecutedEvent>,
}

impl EventTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed event.
    pub fn record(&mut self, event: ExecutedEvent) {
        self.entries.push(event);
    }

    pub fn entries(&self) -> &[ExecutedEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute a deterministic hash of the whole trace.
    ///
    /// Covers each entry's id, the exact bit pattern of its time, and its
    /// label.
    pub fn trace_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for event in &self.entries {
            h = hash_combine(h, event.id.raw());
            h = hash_combine(h, event.time.as_f64().to_bits());
            h = hash_combine(h, label_hash(event.label.as_deref()));
        }
        h
    }

    /// Export the trace to a writer in a deterministic text format.
    ///
    /// One `E <id> <time> <label>` line per entry; the label is hex-encoded
    /// so it never contains whitespace, and `-` stands for no label.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# CHRONON TRACE v1")?;
        writeln!(w, "# events: {}", self.entries.len())?;

        for event in &self.entries {
            let label = match event.label.as_deref() {
                Some(label) => hex_encode(label.as_bytes()),
                None => "-".to_owned(),
            };
            writeln!(w, "E {} {} {}", event.id.raw(), event.time.as_f64(), label)?;
        }

        Ok(())
    }
}

/// Compare two traces for identical dispatch order, times and labels.
pub fn traces_match(a: &EventTrace, b: &EventTrace) -> bool {
    a.entries == b.entries
}

fn label_hash(label: Option<&str>) -> u64 {
    match label {
        None => 1,
        Some(s) => hash_combine(2, hash_bytes(s.as_bytes())),
    }
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use crate::time::VirtualTime;

    fn entry(id: u64, t: f64, label: Option<&'static str>) -> ExecutedEvent {
        ExecutedEvent {
            id: EventId::new(id),
            time: VirtualTime::new(t).unwrap(),
            label: label.map(Into::into),
        }
    }

    #[test]
    fn test_hash_combine_is_order_sensitive() {
        assert_ne!(hash_combine(1, 2), hash_combine(2, 1));
        assert_eq!(hash_combine(7, 9), hash_combine(7, 9));
    }

    #[test]
    fn test_trace_hash_identical_traces() {
        let mut a = EventTrace::new();
        let mut b = EventTrace::new();
        for trace in [&mut a, &mut b] {
            trace.record(entry(0, 0.5, Some("fast")));
            trace.record(entry(1, 1.0, Some("slow")));
        }
        assert_eq!(a.trace_hash(), b.trace_hash());
        assert!(traces_match(&a, &b));
    }

    #[test]
    fn test_trace_hash_detects_time_difference() {
        let mut a = EventTrace::new();
        let mut b = EventTrace::new();
        a.record(entry(0, 1.0, None));
        b.record(entry(0, 1.000001, None));
        assert_ne!(a.trace_hash(), b.trace_hash());
        assert!(!traces_match(&a, &b));
    }

    #[test]
    fn test_trace_hash_detects_label_difference() {
        let mut a = EventTrace::new();
        let mut b = EventTrace::new();
        a.record(entry(0, 1.0, Some("x")));
        b.record(entry(0, 1.0, None));
        assert_ne!(a.trace_hash(), b.trace_hash());
    }

    #[test]
    fn test_export_format() {
        let mut trace = EventTrace::new();
        trace.record(entry(3, 2.5, Some("ab")));
        trace.record(entry(4, 3.0, None));

        let mut buf = Vec::new();
        trace.export(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "# CHRONON TRACE v1\n# events: 2\nE 3 2.5 6162\nE 4 3 -\n"
        );
    }

    #[test]
    fn test_empty_trace() {
        let trace = EventTrace::new();
        assert!(trace.is_empty());
        assert_eq!(trace.len(), 0);
        assert_eq!(trace.trace_hash(), 0);
    }
}
