use std::fmt;

use parking_lot::Mutex;

/// Size of an encoded id: five little-endian `u32`s.
pub const MESSAGE_ID_SIZE: usize = 20;

/// Correlation id shared by a request and its response.
///
/// Ordering follows field order, so ids minted by one generator compare in mint order
/// until the whole counter space wraps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId {
    pub major: u32,
    pub major_revision: u32,
    pub minor: u32,
    pub minor_revision: u32,
    pub process_id: u32,
}

impl MessageId {
    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.major_revision == 0 && self.minor == 0 && self.minor_revision == 0
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= MESSAGE_ID_SIZE);
        let fields = [
            self.major,
            self.major_revision,
            self.minor,
            self.minor_revision,
            self.process_id,
        ];
        for (slot, field) in buf.chunks_exact_mut(4).zip(fields) {
            slot.copy_from_slice(&field.to_le_bytes());
        }
    }

    pub fn read_from(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= MESSAGE_ID_SIZE);
        let field = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Self {
            major: field(0),
            major_revision: field(4),
            minor: field(8),
            minor_revision: field(12),
            process_id: field(16),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}.{}.{}.{}]",
            self.process_id, self.major, self.major_revision, self.minor, self.minor_revision
        )
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Mints monotonically advancing ids stamped with one process id.
pub struct MessageIdGenerator {
    process_id: u32,
    counters: Mutex<[u32; 4]>,
}

impl MessageIdGenerator {
    pub fn new(process_id: u32) -> Self {
        Self::starting_at(process_id, [0; 4])
    }

    /// Uses the OS process id.
    pub fn for_current_process() -> Self {
        Self::new(std::process::id())
    }

    /// `counters` is `[major, major_revision, minor, minor_revision]`.
    pub fn starting_at(process_id: u32, counters: [u32; 4]) -> Self {
        Self {
            process_id,
            counters: Mutex::new(counters),
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn next(&self) -> MessageId {
        let mut counters = self.counters.lock();
        loop {
            // minor_revision is the least significant field; carry towards major.
            for slot in counters.iter_mut().rev() {
                *slot = slot.wrapping_add(1);
                if *slot != 0 {
                    break;
                }
            }
            if counters.iter().any(|c| *c != 0) {
                break;
            }
        }
        let [major, major_revision, minor, minor_revision] = *counters;
        MessageId {
            major,
            major_revision,
            minor,
            minor_revision,
            process_id: self.process_id,
        }
    }
}

impl fmt::Debug for MessageIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageIdGenerator")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}
