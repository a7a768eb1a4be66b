//! Full consistency check of a ranked set's index.

use tally_kv::RangeOptions;
use tally_kv::RangeScanner;
use tally_kv::Transaction;

use super::RankedSet;
use crate::codec::NodeKey;
use crate::codec::decode_count;
use crate::constants::MAX_RANGE_RESULTS;
use crate::error::LayerError;

impl RankedSet {
    /// Read every record of the set and check that each level holds exactly
    /// the head plus the elements promoted to it, with each bucket's count
    /// equal to the elements it spans. Returns the number of elements.
    ///
    /// Reads the whole set; meant for tests and diagnostics.
    pub async fn verify<T>(&self, tr: &T) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        let index = self.index();
        let elements: Vec<Vec<u8>> = self
            .scan_level(tr, 0)
            .await?
            .into_iter()
            .map(|(node, _)| match node {
                NodeKey::Element(key) => Ok(key),
                NodeKey::Head => Err(corrupted("head node on membership level".to_string())),
            })
            .collect::<Result<_, _>>()?;

        for level in 1..index.levels() {
            let nodes = self.scan_level(tr, level).await?;

            let expected: Vec<NodeKey> = std::iter::once(NodeKey::Head)
                .chain(elements.iter().filter(|key| index.assign_level(key) >= level).map(|key| NodeKey::element(key)))
                .collect();
            let found: Vec<&NodeKey> = nodes.iter().map(|(node, _)| node).collect();
            if found.len() != expected.len() || found.iter().zip(&expected).any(|(a, b)| *a != b) {
                return Err(corrupted(format!(
                    "level {level} has {} nodes, expected {}",
                    found.len(),
                    expected.len()
                )));
            }

            for (i, (node, count)) in nodes.iter().enumerate() {
                let lower = match node {
                    NodeKey::Head => 0,
                    NodeKey::Element(key) => elements.partition_point(|e| e < key),
                };
                let upper = match nodes.get(i + 1) {
                    Some((NodeKey::Element(next), _)) => elements.partition_point(|e| e < next),
                    _ => elements.len(),
                };
                let actual = (upper - lower) as i64;
                if *count != actual {
                    return Err(corrupted(format!(
                        "level {level} bucket {i} stores {count}, spans {actual} elements"
                    )));
                }
            }
        }
        Ok(elements.len() as u64)
    }

    async fn scan_level<T>(&self, tr: &T, level: u8) -> Result<Vec<(NodeKey, i64)>, LayerError>
    where T: Transaction + ?Sized {
        let index = self.index();
        let (begin, end) = index.level_range(level);
        let mut scanner = RangeScanner::new(begin, end, RangeOptions::default().with_limit(MAX_RANGE_RESULTS));
        let mut records = Vec::new();
        while let Some(page) = scanner.next_page(tr).await? {
            for entry in page {
                let node = index.decode_node(level, &entry.key)?;
                let count = if level == 0 { 1 } else { decode_count(&entry.value)? };
                records.push((node, count));
            }
        }
        Ok(records)
    }
}

fn corrupted(reason: String) -> LayerError {
    LayerError::Corrupted { reason }
}
