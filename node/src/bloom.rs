//! Bloom-bits indexing of block bodies and the retrieval handlers that
//! serve it.
//!
//! Each block gets a 2048-bit bloom over its transactions. Once a section
//! of `section_size` consecutive blocks is complete it is stored rotated:
//! for every bloom bit, one bitset with a bit per block of the section, so a
//! filter query reads three bitsets instead of every block.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use tessera_crypto::blake2b_256;
use tessera_types::Height;

use crate::service::TaskGroup;

pub const BLOOM_BITS: usize = 2048;
const BLOOM_BYTES: usize = BLOOM_BITS / 8;

/// Pending retrieval requests buffered before handlers pick them up.
pub const BLOOM_REQUEST_QUEUE: usize = 256;

/// The three bloom bits set by `data`.
pub fn bloom_positions(data: &[u8]) -> [usize; 3] {
    let hash = blake2b_256(data);
    let mut out = [0usize; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let v = u16::from_be_bytes([hash[2 * i], hash[2 * i + 1]]) as usize;
        *slot = v % BLOOM_BITS;
    }
    out
}

/// A 2048-bit bloom filter.
#[derive(Clone, PartialEq, Eq)]
pub struct Bloom([u8; BLOOM_BYTES]);

impl Bloom {
    pub fn empty() -> Self {
        Self([0u8; BLOOM_BYTES])
    }

    pub fn of_body(body: &[Vec<u8>]) -> Self {
        let mut bloom = Self::empty();
        for tx in body {
            bloom.add(tx);
        }
        bloom
    }

    pub fn add(&mut self, data: &[u8]) {
        for bit in bloom_positions(data) {
            self.0[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn bit(&self, bit: usize) -> bool {
        self.0[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Possibly contains `data` (no false negatives).
    pub fn contains(&self, data: &[u8]) -> bool {
        bloom_positions(data).iter().all(|b| self.bit(*b))
    }
}

impl std::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = (0..BLOOM_BITS).filter(|b| self.bit(*b)).count();
        write!(f, "Bloom({set} bits set)")
    }
}

struct IndexState {
    next: u64,
    pending: Vec<Bloom>,
    sections: BTreeMap<u64, Vec<Vec<u8>>>,
}

/// Builds rotated bloom-bit sections from blocks processed in height order.
pub struct BloomIndexer {
    section_size: u64,
    state: Mutex<IndexState>,
    closed: AtomicBool,
}

impl BloomIndexer {
    pub fn new(section_size: u64) -> Self {
        Self {
            section_size: section_size.max(8),
            state: Mutex::new(IndexState {
                next: 0,
                pending: Vec::new(),
                sections: BTreeMap::new(),
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn section_size(&self) -> u64 {
        self.section_size
    }

    /// Index the body of the block at `height`.
    ///
    /// Heights must arrive in order. A gap discards the partial section and
    /// restarts at the section containing `height`; a repeated or older
    /// height is ignored.
    pub fn process(&self, height: Height, body: &[Vec<u8>]) {
        if self.is_closed() {
            return;
        }
        let h = height.as_u64();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if h < state.next {
            return;
        }
        if h > state.next {
            let restart = h - h % self.section_size;
            tracing::debug!(expected = state.next, got = h, restart, "bloom indexer gap");
            state.pending.clear();
            state.next = restart;
            if h != restart {
                // Cannot fill the section from its start; wait for the next one.
                state.next = restart + self.section_size;
                return;
            }
        }

        state.pending.push(Bloom::of_body(body));
        state.next = h + 1;

        if state.pending.len() as u64 == self.section_size {
            let section = h / self.section_size;
            let rotated = rotate(&state.pending);
            state.pending.clear();
            state.sections.insert(section, rotated);
            tracing::debug!(section, "bloom section indexed");
        }
    }

    /// Completed sections.
    pub fn sections(&self) -> Vec<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sections.keys().copied().collect()
    }

    /// Bitset of `bit` across `section`, one bit per block.
    pub fn bits(&self, bit: usize, section: u64) -> Option<Vec<u8>> {
        if bit >= BLOOM_BITS {
            return None;
        }
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sections.get(&section).map(|bits| bits[bit].clone())
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("bloom indexer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn rotate(blooms: &[Bloom]) -> Vec<Vec<u8>> {
    let bytes = blooms.len().div_ceil(8);
    let mut out = vec![vec![0u8; bytes]; BLOOM_BITS];
    for (i, bloom) in blooms.iter().enumerate() {
        for (bit, row) in out.iter_mut().enumerate() {
            if bloom.bit(bit) {
                row[i / 8] |= 1 << (7 - i % 8);
            }
        }
    }
    out
}

/// A request for one bloom bit of one section.
pub struct Retrieval {
    pub bit: usize,
    pub section: u64,
    pub reply: oneshot::Sender<Option<Vec<u8>>>,
}

/// Ask the handlers for `bit` of `section`. `None` when the section is not
/// indexed or the handlers are gone.
pub async fn retrieve(
    requests: &mpsc::Sender<Retrieval>,
    bit: usize,
    section: u64,
) -> Option<Vec<u8>> {
    let (reply, rx) = oneshot::channel();
    requests.send(Retrieval { bit, section, reply }).await.ok()?;
    rx.await.ok().flatten()
}

/// Spawn `count` handlers sharing `requests`.
pub fn start_bloom_handlers(
    indexer: Arc<BloomIndexer>,
    requests: mpsc::Receiver<Retrieval>,
    count: usize,
    group: &TaskGroup,
) {
    let requests = Arc::new(tokio::sync::Mutex::new(requests));
    for n in 0..count.max(1) {
        let indexer = indexer.clone();
        let requests = requests.clone();
        let mut shutdown_rx = group.subscribe();
        group.spawn(async move {
            loop {
                let request = tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!(handler = n, "bloom handler shutting down");
                        break;
                    }
                    request = async { requests.lock().await.recv().await } => match request {
                        Some(r) => r,
                        None => break,
                    },
                };
                let bits = indexer.bits(request.bit, request.section);
                let _ = request.reply.send(bits);
            }
        });
    }
    tracing::info!(handlers = count.max(1), "bloom handlers started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bloom_has_no_false_negatives() {
        let body = vec![b"tx-1".to_vec(), b"tx-2".to_vec()];
        let bloom = Bloom::of_body(&body);
        assert!(bloom.contains(b"tx-1"));
        assert!(bloom.contains(b"tx-2"));
        assert!(!Bloom::empty().contains(b"tx-1"));
    }

    #[test]
    fn section_completes_after_section_size_blocks() {
        let indexer = BloomIndexer::new(8);
        for h in 0..7 {
            indexer.process(Height::new(h), &[]);
        }
        assert!(indexer.sections().is_empty());

        indexer.process(Height::new(7), &[b"needle".to_vec()]);
        assert_eq!(indexer.sections(), vec![0]);

        let bit = bloom_positions(b"needle")[0];
        let bits = indexer.bits(bit, 0).unwrap();
        assert_eq!(bits, vec![0b0000_0001]);
    }

    #[test]
    fn gap_restarts_at_next_section() {
        let indexer = BloomIndexer::new(8);
        indexer.process(Height::new(0), &[]);
        indexer.process(Height::new(3), &[]);
        for h in 8..16 {
            indexer.process(Height::new(h), &[]);
        }
        assert_eq!(indexer.sections(), vec![1]);
    }

    #[test]
    fn closed_indexer_ignores_blocks() {
        let indexer = BloomIndexer::new(8);
        indexer.close();
        for h in 0..8 {
            indexer.process(Height::new(h), &[]);
        }
        assert!(indexer.sections().is_empty());
    }

    #[tokio::test]
    async fn handlers_serve_retrievals() {
        let indexer = Arc::new(BloomIndexer::new(8));
        for h in 0..8 {
            indexer.process(Height::new(h), &[b"x".to_vec()]);
        }
        let group = TaskGroup::new("bloom");
        let (tx, rx) = mpsc::channel(4);
        start_bloom_handlers(indexer, rx, 2, &group);

        let bit = bloom_positions(b"x")[1];
        assert_eq!(retrieve(&tx, bit, 0).await, Some(vec![0xff]));
        assert_eq!(retrieve(&tx, bit, 5).await, None);

        group.stop(Duration::from_secs(1)).await;
    }
}
