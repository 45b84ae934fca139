//! Per-application memory of language and code table.
//!
//! Entries are packed into one signed byte: bit 0 is the language, the rest
//! (shifted by one) is the code table. The table is kept sorted so the
//! persisted form is stable, and is written out only when asked.

use std::{collections::BTreeMap, str};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{CodeTable, Language, Persistence, Result};

/// Persistence key of the table.
pub const SMART_SWITCH_KEY: &str = "smart_switch";
/// Most entries a persisted table holds.
pub const MAX_ENTRIES: usize = u16::MAX as usize;
/// Longest bundle id, in UTF-8 bytes, that is persisted.
pub const MAX_BUNDLE_ID_LEN: usize = u8::MAX as usize;

/// Pack a language and code table into one state byte.
pub fn pack(language: Language, table: CodeTable) -> i8 {
    clamp(i32::from(language.raw()) | (i32::from(table.raw()) << 1))
}

/// Split a state byte back into language and code table.
pub fn unpack(state: i8) -> (Language, CodeTable) {
    let bits = state.cast_unsigned();
    (Language::from_raw(bits & 1), CodeTable::from_raw(bits >> 1))
}

/// Clamp into the signed-byte range.
fn clamp(value: i32) -> i8 {
    i8::try_from(value.clamp(i32::from(i8::MIN), i32::from(i8::MAX))).unwrap_or_default()
}

/// Result of a lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Lookup {
    /// A stored state.
    Found(i8),
    /// Nothing stored; the default has been seeded for next time.
    NotFound,
}

impl Lookup {
    /// The decoded state, when found.
    pub fn decoded(self) -> Option<(Language, CodeTable)> {
        match self {
            Self::Found(s) => Some(unpack(s)),
            Self::NotFound => None,
        }
    }
}

/// Guarded table.
#[derive(Debug, Default)]
struct Table {
    /// Bundle id to packed state.
    entries: BTreeMap<String, i8>,
    /// Most recently resolved entry.
    front: Option<(String, i8)>,
}

/// The process-wide smart switch table.
#[derive(Debug, Default)]
pub struct SmartSwitchStore {
    /// Table and front cache under one lock.
    table: Mutex<Table>,
}

impl SmartSwitchStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `bundle_id`. A miss seeds the table with the defaults and
    /// reports [`Lookup::NotFound`]. An empty id is never seeded.
    pub fn lookup(&self, bundle_id: &str, language: Language, table: CodeTable) -> Lookup {
        if bundle_id.is_empty() {
            return Lookup::NotFound;
        }
        let mut t = self.table.lock();
        if let Some((id, state)) = &t.front
            && id == bundle_id
        {
            return Lookup::Found(*state);
        }
        if let Some(state) = t.entries.get(bundle_id).copied() {
            t.front = Some((bundle_id.to_string(), state));
            return Lookup::Found(state);
        }
        let state = pack(language, table);
        t.entries.insert(bundle_id.to_string(), state);
        t.front = Some((bundle_id.to_string(), state));
        trace!(bundle_id, state, "smart_switch_seeded");
        Lookup::NotFound
    }

    /// Record the language and code table in use for `bundle_id`.
    pub fn update(&self, bundle_id: &str, language: Language, table: CodeTable) {
        if bundle_id.is_empty() {
            return;
        }
        let state = pack(language, table);
        let mut t = self.table.lock();
        t.entries.insert(bundle_id.to_string(), state);
        t.front = Some((bundle_id.to_string(), state));
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// No entries held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The persisted form of the current table.
    pub fn serialize(&self) -> Vec<u8> {
        encode(&self.table.lock().entries)
    }

    /// Replace the table with the entries decoded from `bytes`. Returns the
    /// number of entries loaded.
    pub fn load_bytes(&self, bytes: &[u8]) -> usize {
        let entries = decode(bytes);
        let n = entries.len();
        let mut t = self.table.lock();
        t.entries = entries;
        t.front = None;
        n
    }

    /// Write the table through `store`. The lock is released before the
    /// write.
    pub fn persist(&self, store: &dyn Persistence) -> Result<()> {
        let bytes = self.serialize();
        store.save(SMART_SWITCH_KEY, &bytes)?;
        debug!(len = bytes.len(), "smart_switch_persisted");
        Ok(())
    }

    /// Read the table from `store`; a missing blob leaves the table empty.
    pub fn load(&self, store: &dyn Persistence) -> Result<usize> {
        let n = match store.load(SMART_SWITCH_KEY)? {
            Some(bytes) => self.load_bytes(&bytes),
            None => self.load_bytes(&[]),
        };
        debug!(entries = n, "smart_switch_loaded");
        Ok(n)
    }
}

/// Encode `entries` in bundle-id order, dropping ids that are empty or too
/// long and stopping at [`MAX_ENTRIES`].
pub fn encode(entries: &BTreeMap<String, i8>) -> Vec<u8> {
    let kept: Vec<(&String, i8)> = entries
        .iter()
        .filter(|(id, _)| !id.is_empty() && id.len() <= MAX_BUNDLE_ID_LEN)
        .map(|(id, s)| (id, *s))
        .take(MAX_ENTRIES)
        .collect();
    let dropped = entries.len() - kept.len();
    if dropped > 0 {
        warn!(dropped, "smart_switch_entries_dropped");
    }
    let count = u16::try_from(kept.len()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(2 + kept.len() * 24);
    out.extend_from_slice(&count.to_le_bytes());
    for (id, state) in kept {
        let len = u8::try_from(id.len()).unwrap_or(u8::MAX);
        out.push(len);
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(&state.to_le_bytes());
    }
    out
}

/// Decode a persisted table. Parsing stops at the first truncated or
/// malformed entry; everything before it is kept.
pub fn decode(bytes: &[u8]) -> BTreeMap<String, i8> {
    let mut entries = BTreeMap::new();
    let Some((count, mut rest)) = bytes.split_first_chunk::<2>() else {
        return entries;
    };
    let count = u16::from_le_bytes(*count);
    for _ in 0..count {
        let Some((&len, tail)) = rest.split_first() else {
            break;
        };
        let len = usize::from(len);
        if tail.len() < len + 1 {
            break;
        }
        let (id, tail) = tail.split_at(len);
        let Ok(id) = str::from_utf8(id) else {
            break;
        };
        let state = i8::from_le_bytes([tail[0]]);
        if !id.is_empty() {
            entries.insert(id.to_string(), state);
        }
        rest = &tail[1..];
    }
    entries
}
