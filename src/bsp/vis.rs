//! Potentially-visible-set decompression and caching.
//!
//! The visibility lump stores one run-length-compressed bit vector per
//! cluster. Decompression happens lazily: the first request for a cluster
//! expands its vector into an explicit cluster-id list, which is then cached
//! for the lifetime of the map session. The cache is append-only; a race to
//! fill the same cluster computes the same list twice and keeps one copy.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{Result, SourceError};
use crate::lump::LumpReader;

/// Cluster visibility tables for one map session.
pub struct Visibility {
    cluster_count: usize,
    /// Byte offset of each cluster's compressed visibility vector.
    offsets: Vec<i32>,
    data: Vec<u8>,
    cache: RwLock<HashMap<u32, Arc<Vec<u32>>>>,
    decompression_count: AtomicUsize,
}

impl Visibility {
    pub fn parse(lump: &[u8]) -> Result<Self> {
        let mut reader = LumpReader::new(Cursor::new(lump))?;

        let cluster_count = reader.read_i32()?;
        if cluster_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative cluster count {cluster_count}"
            )));
        }

        let mut offsets = Vec::with_capacity(cluster_count as usize);
        for _ in 0..cluster_count {
            let pvs_offset = reader.read_i32()?;
            let _pas_offset = reader.read_i32()?;
            offsets.push(pvs_offset);
        }

        Ok(Self {
            cluster_count: cluster_count as usize,
            offsets,
            data: lump.to_vec(),
            cache: RwLock::new(HashMap::new()),
            decompression_count: AtomicUsize::new(0),
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Clusters visible from `cluster`, cached after the first request.
    pub fn pvs(&self, cluster: u32) -> Result<Arc<Vec<u32>>> {
        if let Some(cached) = self
            .cache
            .read()
            .expect("visibility cache lock poisoned")
            .get(&cluster)
        {
            return Ok(Arc::clone(cached));
        }

        let decompressed = Arc::new(self.decompress(cluster)?);
        let mut cache = self.cache.write().expect("visibility cache lock poisoned");
        // Losing a fill race is benign; both sides computed the same list.
        Ok(Arc::clone(cache.entry(cluster).or_insert(decompressed)))
    }

    /// How many decompression runs have happened; at most one per cluster.
    pub fn decompression_count(&self) -> usize {
        self.decompression_count.load(Ordering::Relaxed)
    }

    fn decompress(&self, cluster: u32) -> Result<Vec<u32>> {
        self.decompression_count.fetch_add(1, Ordering::Relaxed);

        let offset = *self.offsets.get(cluster as usize).ok_or_else(|| {
            SourceError::CrossReference(format!(
                "cluster {cluster} outside visibility table of {}",
                self.cluster_count
            ))
        })?;
        if offset < 0 || offset as usize >= self.data.len() {
            return Err(SourceError::Malformed(format!(
                "visibility offset {offset} outside lump of {} bytes",
                self.data.len()
            )));
        }

        let mut visible = Vec::new();
        let mut cursor = offset as usize;
        let mut index = 0usize;
        while index < self.cluster_count {
            let byte = self.next_byte(&mut cursor)?;
            if byte == 0 {
                // A zero byte precedes a run length of zero bytes.
                let run = self.next_byte(&mut cursor)?;
                if run == 0 {
                    return Err(SourceError::Malformed(
                        "zero-length run in visibility data".to_string(),
                    ));
                }
                index += run as usize * 8;
                continue;
            }
            for bit in 0..8 {
                if index >= self.cluster_count {
                    break;
                }
                if byte & (1 << bit) != 0 {
                    visible.push(index as u32);
                }
                index += 1;
            }
        }

        Ok(visible)
    }

    fn next_byte(&self, cursor: &mut usize) -> Result<u8> {
        let byte = *self.data.get(*cursor).ok_or_else(|| {
            SourceError::Malformed("visibility data truncated".to_string())
        })?;
        *cursor += 1;
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Run-length compress a per-cluster visibility bit vector.
    fn compress(bits: &[bool]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (bit, &set) in chunk.iter().enumerate() {
                if set {
                    byte |= 1 << bit;
                }
            }
            bytes.push(byte);
        }

        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != 0 {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            let mut run = 0u8;
            while i < bytes.len() && bytes[i] == 0 && run < u8::MAX {
                run += 1;
                i += 1;
            }
            out.push(0);
            out.push(run);
        }
        out
    }

    fn vis_lump(per_cluster_bits: &[Vec<bool>]) -> Vec<u8> {
        let cluster_count = per_cluster_bits.len();
        let table_size = 4 + 8 * cluster_count;

        let mut vectors = Vec::new();
        let mut offsets = Vec::new();
        for bits in per_cluster_bits {
            offsets.push((table_size + vectors.len()) as i32);
            vectors.extend_from_slice(&compress(bits));
        }

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(cluster_count as i32).unwrap();
        for offset in offsets {
            data.write_i32::<LittleEndian>(offset).unwrap();
            data.write_i32::<LittleEndian>(0).unwrap(); // audible-set offset
        }
        data.extend_from_slice(&vectors);
        data
    }

    fn bits(cluster_count: usize, visible: &[usize]) -> Vec<bool> {
        let mut bits = vec![false; cluster_count];
        for &index in visible {
            bits[index] = true;
        }
        bits
    }

    #[test]
    fn test_decompression_recovers_cluster_list() {
        // 20 clusters; cluster 0 sees a sparse set spanning a zero run.
        let lump = vis_lump(&[bits(20, &[0, 3, 17]), bits(20, &[1])]);
        let vis = Visibility::parse(&lump).unwrap();

        assert_eq!(vis.cluster_count(), 2);
        assert_eq!(*vis.pvs(0).unwrap(), vec![0, 3, 17]);
        assert_eq!(*vis.pvs(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_repeated_requests_hit_the_cache() {
        let lump = vis_lump(&[bits(16, &[2, 9])]);
        let vis = Visibility::parse(&lump).unwrap();

        let first = vis.pvs(0).unwrap();
        let second = vis.pvs(0).unwrap();
        assert_eq!(first, second);
        assert_eq!(vis.decompression_count(), 1);
    }

    #[test]
    fn test_cluster_outside_table_is_cross_reference() {
        let lump = vis_lump(&[bits(8, &[0])]);
        let vis = Visibility::parse(&lump).unwrap();
        assert!(matches!(
            vis.pvs(5),
            Err(SourceError::CrossReference(_))
        ));
    }

    #[test]
    fn test_truncated_vector_is_malformed() {
        let mut lump = vis_lump(&[bits(64, &[63])]);
        lump.truncate(lump.len() - 2);
        let vis = Visibility::parse(&lump).unwrap();
        assert!(matches!(vis.pvs(0), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn test_concurrent_readers_share_one_decompression() {
        let lump = vis_lump(&[bits(32, &[1, 30])]);
        let vis = std::sync::Arc::new(Visibility::parse(&lump).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let vis = Arc::clone(&vis);
                std::thread::spawn(move || vis.pvs(0).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for result in &results {
            assert_eq!(**result, vec![1, 30]);
        }
        // A race may decompress more than once, but the cache holds one
        // entry and later calls are pure lookups.
        let after = vis.decompression_count();
        let _ = vis.pvs(0).unwrap();
        assert_eq!(vis.decompression_count(), after);
    }
}
