//! BRC-74 merkle paths (BUMPs).
//!
//! Levels and leaves keep the order they were parsed or built in, so a
//! parsed path re-serializes to the same bytes.

use std::collections::BTreeMap;

use bsv_primitives::chainhash::{double_hash_h, Hash};
use bsv_primitives::util::{BsvReader, BsvWriter, VarInt};
use serde::{Deserialize, Serialize};

use crate::error::SpvError;

const FLAG_DUPLICATE: u8 = 0x01;
const FLAG_TXID: u8 = 0x02;

/// Parent node of two children in internal byte order.
pub fn merkle_tree_parent(left: &Hash, right: &Hash) -> Hash {
    let mut concatenated = [0u8; 64];
    concatenated[..32].copy_from_slice(left.as_bytes());
    concatenated[32..].copy_from_slice(right.as_bytes());
    double_hash_h(&concatenated)
}

/// One node of a path level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathElement {
    pub offset: u64,
    /// Absent when `duplicate` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash>,
    /// Marks a leaf that is a transaction the path is meant to prove.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub txid: bool,
    /// The sibling of an odd last node: its hash equals its pair's.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl PathElement {
    pub fn leaf(offset: u64, hash: Hash, txid: bool) -> Self {
        PathElement { offset, hash: Some(hash), txid, duplicate: false }
    }

    pub fn duplicate(offset: u64) -> Self {
        PathElement { offset, hash: None, txid: false, duplicate: true }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.duplicate {
            flags |= FLAG_DUPLICATE;
        }
        if self.txid {
            flags |= FLAG_TXID;
        }
        flags
    }
}

/// Merkle inclusion proof of one or more transactions in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerklePath {
    pub block_height: u32,
    /// Levels from the leaves (index 0) upward.
    pub path: Vec<Vec<PathElement>>,
}

impl MerklePath {
    pub fn new(block_height: u32, path: Vec<Vec<PathElement>>) -> Self {
        MerklePath { block_height, path }
    }

    /// Proof for the only transaction of a block: its txid is the root.
    pub fn single_transaction(block_height: u32, txid: Hash) -> Self {
        MerklePath::new(block_height, vec![vec![PathElement::leaf(0, txid, true)]])
    }

    pub fn from_hex(hex_data: &str) -> Result<Self, SpvError> {
        Self::from_bytes(&hex::decode(hex_data)?)
    }

    /// Parse one path; trailing bytes are an error.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SpvError> {
        let mut reader = BsvReader::new(data);
        let path = Self::read_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(SpvError::InvalidMerklePath(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(path)
    }

    pub fn read_from(reader: &mut BsvReader) -> Result<Self, SpvError> {
        let block_height = reader.read_varint().map_err(truncated("block height"))?.value();
        let block_height = u32::try_from(block_height)
            .map_err(|_| SpvError::InvalidMerklePath(format!("block height {}", block_height)))?;
        let tree_height = reader.read_u8().map_err(truncated("tree height"))?;
        if tree_height == 0 {
            return Err(SpvError::InvalidMerklePath("empty path".to_string()));
        }

        let mut path = Vec::with_capacity(tree_height as usize);
        for _ in 0..tree_height {
            let n_leaves = reader.read_varint().map_err(truncated("leaf count"))?.value();
            let mut level = Vec::with_capacity(n_leaves.min(1024) as usize);
            for _ in 0..n_leaves {
                let offset = reader.read_varint().map_err(truncated("offset"))?.value();
                let flags = reader.read_u8().map_err(truncated("flags"))?;
                let duplicate = flags & FLAG_DUPLICATE != 0;
                let hash = if duplicate {
                    None
                } else {
                    Some(Hash::new(reader.read_32().map_err(truncated("hash"))?))
                };
                level.push(PathElement { offset, hash, txid: flags & FLAG_TXID != 0, duplicate });
            }
            path.push(level);
        }

        Ok(MerklePath { block_height, path })
    }

    pub fn write_to(&self, writer: &mut BsvWriter) {
        writer.write_varint(VarInt(self.block_height as u64));
        writer.write_u8(self.path.len() as u8);
        for level in &self.path {
            writer.write_varint(VarInt::from(level.len()));
            for leaf in level {
                writer.write_varint(VarInt(leaf.offset));
                writer.write_u8(leaf.flags());
                if let (false, Some(hash)) = (leaf.duplicate, &leaf.hash) {
                    writer.write_bytes(hash.as_bytes());
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BsvWriter::new();
        self.write_to(&mut writer);
        writer.into_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Whether `txid` is one of the level-0 leaves.
    pub fn contains(&self, txid: &Hash) -> bool {
        self.level0().any(|leaf| leaf.hash.as_ref() == Some(txid))
    }

    /// Level-0 hashes flagged as proven transactions.
    pub fn txids(&self) -> Vec<Hash> {
        self.level0().filter(|l| l.txid).filter_map(|l| l.hash).collect()
    }

    fn level0(&self) -> impl Iterator<Item = &PathElement> {
        self.path.first().into_iter().flatten()
    }

    /// Merkle root reached from `txid`, or from the first level-0 hash when
    /// `txid` is `None`.
    pub fn compute_root(&self, txid: Option<&Hash>) -> Result<Hash, SpvError> {
        let txid = match txid {
            Some(t) => *t,
            None => self
                .level0()
                .find_map(|l| l.hash)
                .ok_or_else(|| SpvError::InvalidMerklePath("no hash at level 0".to_string()))?,
        };

        if self.path.len() == 1 && self.path[0].len() == 1 {
            return Ok(txid);
        }

        let leaf = self
            .level0()
            .find(|l| l.hash.as_ref() == Some(&txid))
            .ok_or_else(|| {
                SpvError::InvalidMerklePath(format!("path does not contain txid {}", txid))
            })?;

        let indexed = IndexedPath::new(&self.path);
        let index = leaf.offset;
        let mut working = txid;
        for height in 0..self.path.len() {
            let offset = (index >> height) ^ 1;
            let sibling = indexed.node(height, offset).ok_or_else(|| {
                SpvError::InvalidMerklePath(format!(
                    "missing hash at height {} offset {}",
                    height, offset
                ))
            })?;
            working = match sibling {
                Node::Duplicate => merkle_tree_parent(&working, &working),
                Node::Hash(h) if offset % 2 != 0 => merkle_tree_parent(&working, &h),
                Node::Hash(h) => merkle_tree_parent(&h, &working),
            };
        }
        Ok(working)
    }

    /// Fold `other` into this path. Both must prove into the same block.
    pub fn combine(&mut self, other: &MerklePath) -> Result<(), SpvError> {
        if self.block_height != other.block_height {
            return Err(SpvError::InvalidMerklePath(
                "cannot combine paths with different block heights".to_string(),
            ));
        }
        if self.compute_root(None)? != other.compute_root(None)? {
            return Err(SpvError::InvalidMerklePath(
                "cannot combine paths with different roots".to_string(),
            ));
        }

        let height = self.path.len().max(other.path.len());
        let mut levels: Vec<BTreeMap<u64, PathElement>> = vec![BTreeMap::new(); height];
        for source in [&self.path, &other.path] {
            for (h, level) in source.iter().enumerate() {
                for elem in level {
                    let slot = levels[h].entry(elem.offset).or_insert_with(|| elem.clone());
                    slot.txid |= elem.txid;
                }
            }
        }

        // A node whose two children are both present is derivable.
        let mut path = Vec::with_capacity(height);
        for h in 0..height {
            let level = levels[h]
                .values()
                .filter(|elem| {
                    h == 0
                        || !(levels[h - 1].contains_key(&(elem.offset * 2))
                            && levels[h - 1].contains_key(&(elem.offset * 2 + 1)))
                })
                .cloned()
                .collect();
            path.push(level);
        }
        self.path = path;
        Ok(())
    }
}

fn truncated(what: &'static str) -> impl Fn(bsv_primitives::PrimitivesError) -> SpvError {
    move |e| SpvError::InvalidMerklePath(format!("reading {}: {}", what, e))
}

#[derive(Clone, Copy)]
enum Node {
    Hash(Hash),
    Duplicate,
}

struct IndexedPath<'a>(Vec<BTreeMap<u64, &'a PathElement>>);

impl<'a> IndexedPath<'a> {
    fn new(path: &'a [Vec<PathElement>]) -> Self {
        IndexedPath(
            path.iter()
                .map(|level| level.iter().map(|e| (e.offset, e)).collect())
                .collect(),
        )
    }

    /// The node at (`height`, `offset`), computing it from its children
    /// when the path does not carry it.
    fn node(&self, height: usize, offset: u64) -> Option<Node> {
        if let Some(elem) = self.0.get(height)?.get(&offset) {
            return if elem.duplicate { Some(Node::Duplicate) } else { elem.hash.map(Node::Hash) };
        }
        if height == 0 {
            return None;
        }
        let left = match self.node(height - 1, offset * 2)? {
            Node::Hash(h) => h,
            Node::Duplicate => return None,
        };
        let parent = match self.node(height - 1, offset * 2 + 1)? {
            Node::Duplicate => merkle_tree_parent(&left, &left),
            Node::Hash(right) => merkle_tree_parent(&left, &right),
        };
        Some(Node::Hash(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRC74_HEX: &str = "fe8a6a0c000c04fde80b0011774f01d26412f0d16ea3f0447be0b5ebec67b0782e321a7a01cbdf7f734e30fde90b02004e53753e3fe4667073063a17987292cfdea278824e9888e52180581d7188d8fdea0b025e441996fc53f0191d649e68a200e752fb5f39e0d5617083408fa179ddc5c998fdeb0b0102fdf405000671394f72237d08a4277f4435e5b6edf7adc272f25effef27cdfe805ce71a81fdf50500262bccabec6c4af3ed00cc7a7414edea9c5efa92fb8623dd6160a001450a528201fdfb020101fd7c010093b3efca9b77ddec914f8effac691ecb54e2c81d0ab81cbc4c4b93befe418e8501bf01015e005881826eb6973c54003a02118fe270f03d46d02681c8bc71cd44c613e86302f8012e00e07a2bb8bb75e5accff266022e1e5e6e7b4d6d943a04faadcf2ab4a22f796ff30116008120cafa17309c0bb0e0ffce835286b3a2dcae48e4497ae2d2b7ced4f051507d010a00502e59ac92f46543c23006bff855d96f5e648043f0fb87a7a5949e6a9bebae430104001ccd9f8f64f4d0489b30cc815351cf425e0e78ad79a589350e4341ac165dbe45010301010000af8764ce7e1cc132ab5ed2229a005c87201c9a5ee15c0f91dd53eff31ab30cd4";
    const BRC74_ROOT: &str = "57aab6e6fb1b697174ffb64e062c4728f2ffd33ddcfa02a43b64d8cd29b483b4";
    const BRC74_TXID1: &str = "304e737fdfcb017a1a322e78b067ecebb5e07b44f0a36ed1f01264d2014f7711";
    const BRC74_TXID2: &str = "d888711d588021e588984e8278a2decf927298173a06737066e43f3e75534e00";
    const BRC74_TXID3: &str = "98c9c5dd79a18f40837061d5e0395ffb52e700a2689e641d19f053fc9619445e";

    fn h(s: &str) -> Hash {
        Hash::from_hex(s).unwrap()
    }

    fn root_for(mp: &MerklePath, txid: &str) -> Result<String, SpvError> {
        mp.compute_root(Some(&h(txid))).map(|r| r.to_string())
    }

    #[test]
    fn test_parent_of_display_order_pair() {
        let parent = merkle_tree_parent(
            &h("d6c79a6ef05572f0cb8e9a450c561fc40b0a8a7d48faad95e20d93ddeb08c231"),
            &h("b1ed931b79056438b990d8981ba46fae97e5574b142445a74a44b978af284f98"),
        );
        assert_eq!(
            parent.to_string(),
            "b0d537b3ee52e472507f453df3d69561720346118a5a8c4d85ca0de73bc792be"
        );
    }

    #[test]
    fn test_brc74_bytes_survive_reserialization() {
        let mp = MerklePath::from_hex(BRC74_HEX).unwrap();
        assert_eq!(mp.block_height, 813706);
        assert_eq!(mp.to_hex(), BRC74_HEX);
    }

    #[test]
    fn test_brc74_roots() {
        let mp = MerklePath::from_hex(BRC74_HEX).unwrap();
        for txid in [BRC74_TXID1, BRC74_TXID2, BRC74_TXID3] {
            assert_eq!(root_for(&mp, txid).unwrap(), BRC74_ROOT);
        }
        assert!(mp.contains(&h(BRC74_TXID2)));
        assert_eq!(mp.txids().len(), 2);
    }

    #[test]
    fn test_unknown_txid_has_no_root() {
        let mp = MerklePath::from_hex(BRC74_HEX).unwrap();
        let missing = "00".repeat(32);
        assert!(root_for(&mp, &missing).is_err());
    }

    #[test]
    fn test_single_transaction_root_is_txid() {
        let txid = h(BRC74_TXID1);
        let mp = MerklePath::single_transaction(100, txid);
        assert_eq!(mp.compute_root(None).unwrap(), txid);
        let back = MerklePath::from_bytes(&mp.to_bytes()).unwrap();
        assert_eq!(back, mp);
        assert_eq!(back.txids(), vec![txid]);
    }

    #[test]
    fn test_combine_split_paths() {
        let mp = MerklePath::from_hex(BRC74_HEX).unwrap();

        let mut level0_a = mp.path[0][..2].to_vec();
        level0_a.extend_from_slice(&mp.path[0][4..]);
        let level0_b = mp.path[0][2..].to_vec();
        let level1_a = mp.path[1][1..].to_vec();
        let level1_b = mp.path[1][..mp.path[1].len() - 1].to_vec();

        let mut a_levels = vec![level0_a, level1_a];
        a_levels.extend_from_slice(&mp.path[2..]);
        let mut path_a = MerklePath::new(mp.block_height, a_levels);

        let mut b_levels = vec![level0_b, level1_b];
        b_levels.extend_from_slice(&mp.path[2..]);
        let path_b = MerklePath::new(mp.block_height, b_levels);

        assert_eq!(root_for(&path_a, BRC74_TXID2).unwrap(), BRC74_ROOT);
        assert!(root_for(&path_a, BRC74_TXID3).is_err());
        assert_eq!(root_for(&path_b, BRC74_TXID3).unwrap(), BRC74_ROOT);
        assert!(root_for(&path_b, BRC74_TXID2).is_err());

        path_a.combine(&path_b).unwrap();
        assert_eq!(root_for(&path_a, BRC74_TXID2).unwrap(), BRC74_ROOT);
        assert_eq!(root_for(&path_a, BRC74_TXID3).unwrap(), BRC74_ROOT);
    }

    #[test]
    fn test_combine_rejects_other_block() {
        let mut a = MerklePath::single_transaction(1, h(BRC74_TXID1));
        let b = MerklePath::single_transaction(2, h(BRC74_TXID1));
        assert!(a.combine(&b).is_err());
    }

    #[test]
    fn test_duplicate_sibling() {
        let l0 = h(&format!("{}01", "00".repeat(31)));
        let l1 = h(&format!("{}02", "00".repeat(31)));
        let l2 = h(&format!("{}03", "00".repeat(31)));
        let mp = MerklePath::new(
            7,
            vec![
                vec![PathElement::leaf(2, l2, true), PathElement::duplicate(3)],
                vec![PathElement::leaf(0, merkle_tree_parent(&l0, &l1), false)],
            ],
        );
        let expected =
            merkle_tree_parent(&merkle_tree_parent(&l0, &l1), &merkle_tree_parent(&l2, &l2));
        assert_eq!(mp.compute_root(Some(&l2)).unwrap(), expected);
        assert_eq!(MerklePath::from_bytes(&mp.to_bytes()).unwrap(), mp);
    }

    #[test]
    fn test_valid_bumps_parse() {
        let valid = [
            "fed79f0c000c02fd3803029b490d9c8358ff11afaf45628417c9eb52c1a1fd404078a101b4f71dbba06aa9fd390300fe82f2768edc3d0cfe4d06b7f390dcb0b7e61cca7f70117d83be0f023204d8ef01fd9d010060893ac65c8a8e6b9ef7ed5e05dc3bd25aa904812c09853c5dbf423b58a75d0e01cf0012c3c76d9c332e4701b27bfe7013e7963b92d1851d59c56955b35aecabbc8bae0166000894384f86a5c4d0d294f9b9441c3ee3d13afa094cca4515d32813b3fa4fdf3601320002aac507f74c9ff2676705eee1e70897a8baeecaf30c5f49bb22a0c5ce5fda9a01180021f7e27a08d61245be893a238853d72340881cbd47e0a390895231fa1cc44db9010d004d7a12738a1654777867182ee6f6efc4d692209badfa5ba9bb126d08da18ed880107004f8e96b4ee6154bd44b7709f3fb4041bf4426d5f5a594408345605e254af7cdd010200ec7d8b185bc7c096b9b88de6f63ab22baf738d5fc4cbc328f2e00644749acf520100007fd48b1d2b678907ba045b07132003db8116468cd6a3d4764e0df4a644ea0a220101009bb8ffc1a6ed2ba80ea1b09ff797387115a7129d19e93c003a74e3a20ed6ce590101001106e6ece3f70a16de42d0f87b459c71a2440201728bd8541334933726807921",
        ];
        for hex_str in valid {
            let mp = MerklePath::from_hex(hex_str).unwrap();
            assert_eq!(mp.to_hex(), hex_str);
        }
    }

    #[test]
    fn test_truncated_bump_rejected() {
        // Declares 12 levels but carries one.
        let truncated = "feb39d0c000c01fd9b030012f77e65627c341a3aaea3a0ed645c0082ef53995f446ab9901a27e4622fd1cc";
        assert!(matches!(
            MerklePath::from_hex(truncated),
            Err(SpvError::InvalidMerklePath(_))
        ));
        assert!(MerklePath::from_bytes(&[]).is_err());
    }
}
