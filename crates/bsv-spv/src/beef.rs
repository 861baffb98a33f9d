//! BEEF transaction bundles: BRC-62 (V1), BRC-96 (V2) and BRC-95 (Atomic).
//!
//! A [`Beef`] keeps transactions and BUMPs in the order they were parsed or
//! merged, so `from_bytes` followed by `to_bytes` reproduces the input.

use std::collections::{HashMap, HashSet};
use std::fmt;

use bsv_primitives::chainhash::Hash;
use bsv_primitives::util::{BsvReader, BsvWriter, VarInt};
use bsv_transaction::Transaction;

use crate::chain_tracker::ChainTracker;
use crate::error::SpvError;
use crate::merkle_path::MerklePath;

/// `0100beef` on the wire.
pub const BEEF_V1: u32 = 4022206465;
/// `0200beef` on the wire.
pub const BEEF_V2: u32 = 4022206466;
/// Prefix of an Atomic BEEF, followed by the 32-byte subject txid.
pub const ATOMIC_BEEF: u32 = 0x01010101;

/// How a V2 transaction record is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataFormat {
    RawTx = 0,
    RawTxAndBumpIndex = 1,
    TxIDOnly = 2,
}

impl TryFrom<u8> for DataFormat {
    type Error = SpvError;

    fn try_from(v: u8) -> Result<Self, SpvError> {
        match v {
            0 => Ok(DataFormat::RawTx),
            1 => Ok(DataFormat::RawTxAndBumpIndex),
            2 => Ok(DataFormat::TxIDOnly),
            _ => Err(SpvError::InvalidBeef(format!("invalid data format: {}", v))),
        }
    }
}

/// One transaction record: either the full transaction or only its txid.
#[derive(Debug, Clone)]
pub struct BeefTx {
    txid: Hash,
    transaction: Option<Transaction>,
    /// Index into [`Beef::bumps`] of the path proving this transaction.
    pub bump_index: Option<usize>,
}

impl BeefTx {
    pub fn raw(transaction: Transaction, bump_index: Option<usize>) -> Self {
        BeefTx { txid: transaction.tx_id(), transaction: Some(transaction), bump_index }
    }

    pub fn txid_only(txid: Hash) -> Self {
        BeefTx { txid, transaction: None, bump_index: None }
    }

    pub fn txid(&self) -> Hash {
        self.txid
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn is_txid_only(&self) -> bool {
        self.transaction.is_none()
    }

    pub fn data_format(&self) -> DataFormat {
        match (&self.transaction, self.bump_index) {
            (None, _) => DataFormat::TxIDOnly,
            (Some(_), Some(_)) => DataFormat::RawTxAndBumpIndex,
            (Some(_), None) => DataFormat::RawTx,
        }
    }

    fn parent_txids(&self) -> impl Iterator<Item = Hash> + '_ {
        self.transaction.iter().flat_map(|tx| tx.inputs.iter().map(|i| i.outpoint.txid))
    }
}

/// Transactions plus the merkle paths anchoring them to blocks.
#[derive(Debug, Clone)]
pub struct Beef {
    pub version: u32,
    /// Set for Atomic BEEF: the one transaction the bundle is about.
    pub atomic_txid: Option<Hash>,
    pub bumps: Vec<MerklePath>,
    pub txs: Vec<BeefTx>,
}

impl Default for Beef {
    fn default() -> Self {
        Self::new()
    }
}

impl Beef {
    /// Empty V2 bundle.
    pub fn new() -> Self {
        Self::with_version(BEEF_V2)
    }

    pub fn new_v1() -> Self {
        Self::with_version(BEEF_V1)
    }

    fn with_version(version: u32) -> Self {
        Beef { version, atomic_txid: None, bumps: Vec::new(), txs: Vec::new() }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic_txid.is_some()
    }

    // -----------------------------------------------------------------
    // Wire format
    // -----------------------------------------------------------------

    pub fn from_hex(hex_str: &str) -> Result<Self, SpvError> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SpvError> {
        let mut reader = BsvReader::new(data);

        let mut version = reader.read_u32_le().map_err(truncated("version"))?;
        let mut atomic_txid = None;
        if version == ATOMIC_BEEF {
            atomic_txid = Some(Hash::new(reader.read_32().map_err(truncated("atomic txid"))?));
            version = reader.read_u32_le().map_err(truncated("version"))?;
        }
        if version != BEEF_V1 && version != BEEF_V2 {
            return Err(SpvError::InvalidBeef(format!("unknown version {:#010x}", version)));
        }

        let n_bumps = reader.read_varint().map_err(truncated("bump count"))?.value();
        let mut bumps = Vec::with_capacity(n_bumps.min(1024) as usize);
        for _ in 0..n_bumps {
            bumps.push(MerklePath::read_from(&mut reader)?);
        }

        let n_txs = reader.read_varint().map_err(truncated("transaction count"))?.value();
        let mut txs = Vec::with_capacity(n_txs.min(1024) as usize);
        for _ in 0..n_txs {
            let beef_tx = if version == BEEF_V1 {
                read_v1_tx(&mut reader)?
            } else {
                read_v2_tx(&mut reader)?
            };
            if let Some(index) = beef_tx.bump_index {
                if index >= bumps.len() {
                    return Err(SpvError::InvalidBeef(format!(
                        "transaction {} references bump {} of {}",
                        beef_tx.txid,
                        index,
                        bumps.len()
                    )));
                }
            }
            txs.push(beef_tx);
        }

        if reader.remaining() != 0 {
            return Err(SpvError::InvalidBeef(format!("{} trailing bytes", reader.remaining())));
        }

        let beef = Beef { version, atomic_txid, bumps, txs };
        if let Some(target) = beef.atomic_txid {
            beef.find_transaction(&target).map_err(|_| {
                SpvError::InvalidBeef(format!("atomic subject {} is not in the bundle", target))
            })?;
        }
        Ok(beef)
    }

    /// V1 cannot carry txid-only records; a bundle holding any is written as V2.
    fn wire_version(&self) -> u32 {
        if self.txs.iter().any(BeefTx::is_txid_only) {
            BEEF_V2
        } else {
            self.version
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BsvWriter::with_capacity(1024);
        if let Some(target) = &self.atomic_txid {
            writer.write_u32_le(ATOMIC_BEEF);
            writer.write_bytes(target.as_bytes());
        }

        let version = self.wire_version();
        writer.write_u32_le(version);

        writer.write_varint(VarInt::from(self.bumps.len()));
        for bump in &self.bumps {
            bump.write_to(&mut writer);
        }

        writer.write_varint(VarInt::from(self.txs.len()));
        for beef_tx in &self.txs {
            match (&beef_tx.transaction, version) {
                (None, _) => {
                    writer.write_u8(DataFormat::TxIDOnly as u8);
                    writer.write_bytes(beef_tx.txid.as_bytes());
                }
                (Some(tx), BEEF_V1) => {
                    tx.write_to(&mut writer);
                    match beef_tx.bump_index {
                        Some(index) => {
                            writer.write_u8(1);
                            writer.write_varint(VarInt::from(index));
                        }
                        None => writer.write_u8(0),
                    }
                }
                (Some(tx), _) => {
                    writer.write_u8(beef_tx.data_format() as u8);
                    if let Some(index) = beef_tx.bump_index {
                        writer.write_varint(VarInt::from(index));
                    }
                    tx.write_to(&mut writer);
                }
            }
        }

        writer.into_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Multi-line dump of the bundle for logs.
    pub fn to_log_string(&self) -> String {
        LogDump(self).to_string()
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    pub fn find_transaction(&self, txid: &Hash) -> Result<&BeefTx, SpvError> {
        self.txs
            .iter()
            .find(|t| t.txid == *txid)
            .ok_or(SpvError::TransactionNotFound(*txid))
    }

    /// The BUMP whose leaves include `txid`.
    pub fn find_bump(&self, txid: &Hash) -> Option<&MerklePath> {
        self.bumps.iter().find(|b| b.contains(txid))
    }

    /// A copy of the transaction with each input's source output filled in
    /// from the parents carried by the bundle.
    ///
    /// A parent may only be absent when the transaction itself is proven.
    pub fn find_atomic_transaction(&self, txid: &Hash) -> Result<Transaction, SpvError> {
        let node = self.find_transaction(txid)?;
        let mut tx = node.transaction.clone().ok_or_else(|| {
            SpvError::InvalidBeef(format!("transaction {} is carried as txid only", txid))
        })?;

        for input in tx.inputs.iter_mut().filter(|i| i.source_output.is_none()) {
            let parent = self.find_transaction(&input.outpoint.txid).ok().and_then(BeefTx::transaction);
            match parent {
                Some(parent) => {
                    let output = parent.outputs.get(input.outpoint.vout as usize).ok_or_else(|| {
                        SpvError::InvalidBeef(format!("{} has no such output", input.outpoint))
                    })?;
                    input.source_output = Some(output.clone());
                }
                None if node.bump_index.is_some() => {}
                None => {
                    return Err(SpvError::MissingAncestor {
                        txid: *txid,
                        parent: input.outpoint.txid,
                    })
                }
            }
        }
        Ok(tx)
    }

    // -----------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------

    /// Add a BUMP, combining it with an existing path for the same block.
    /// Unproven raw transactions it covers are linked to it.
    pub fn merge_bump(&mut self, bump: &MerklePath) -> Result<usize, SpvError> {
        let root = bump_root(bump)?;
        let existing = self
            .bumps
            .iter()
            .position(|b| b.block_height == bump.block_height && bump_root(b).ok() == Some(root));

        let index = match existing {
            Some(i) => {
                self.bumps[i].combine(bump)?;
                i
            }
            None => {
                self.bumps.push(bump.clone());
                self.bumps.len() - 1
            }
        };

        let merged = &self.bumps[index];
        for beef_tx in self.txs.iter_mut() {
            if beef_tx.bump_index.is_none() && !beef_tx.is_txid_only() && merged.contains(&beef_tx.txid) {
                beef_tx.bump_index = Some(index);
            }
        }
        Ok(index)
    }

    /// Add a raw transaction, or upgrade a txid-only record of it. An
    /// already present raw record is kept.
    pub fn merge_transaction(&mut self, tx: Transaction) -> Hash {
        let txid = tx.tx_id();
        let bump_index = self.bumps.iter().position(|b| b.contains(&txid));
        match self.txs.iter_mut().find(|t| t.txid == txid) {
            Some(existing) if existing.is_txid_only() => {
                existing.transaction = Some(tx);
                existing.bump_index = bump_index;
            }
            Some(_) => {}
            None => self.txs.push(BeefTx { txid, transaction: Some(tx), bump_index }),
        }
        txid
    }

    /// Merge `bump` and then the transaction it proves.
    pub fn merge_proven_transaction(
        &mut self,
        tx: Transaction,
        bump: &MerklePath,
    ) -> Result<Hash, SpvError> {
        let txid = tx.tx_id();
        if !bump.contains(&txid) {
            return Err(SpvError::InvalidMerklePath(format!("path does not contain {}", txid)));
        }
        self.merge_bump(bump)?;
        Ok(self.merge_transaction(tx))
    }

    pub fn merge_txid_only(&mut self, txid: Hash) {
        if self.txs.iter().all(|t| t.txid != txid) {
            self.txs.push(BeefTx::txid_only(txid));
        }
    }

    /// Fold every BUMP and transaction of `other` into this bundle.
    pub fn merge_beef(&mut self, other: &Beef) -> Result<(), SpvError> {
        for bump in &other.bumps {
            self.merge_bump(bump)?;
        }
        for beef_tx in &other.txs {
            match &beef_tx.transaction {
                Some(tx) => {
                    self.merge_transaction(tx.clone());
                }
                None => self.merge_txid_only(beef_tx.txid),
            }
        }
        Ok(())
    }

    /// Reorder so every transaction follows the parents the bundle carries.
    /// Relative order is otherwise kept.
    pub fn sort_txs(&mut self) {
        let index: HashMap<Hash, usize> =
            self.txs.iter().enumerate().map(|(i, t)| (t.txid, i)).collect();
        let mut visited = vec![false; self.txs.len()];
        let mut order = Vec::with_capacity(self.txs.len());

        fn visit(
            i: usize,
            txs: &[BeefTx],
            index: &HashMap<Hash, usize>,
            visited: &mut [bool],
            order: &mut Vec<usize>,
        ) {
            if visited[i] {
                return;
            }
            visited[i] = true;
            for parent in txs[i].parent_txids() {
                if let Some(&p) = index.get(&parent) {
                    visit(p, txs, index, visited, order);
                }
            }
            order.push(i);
        }

        for i in 0..self.txs.len() {
            visit(i, &self.txs, &index, &mut visited, &mut order);
        }

        let mut slots: Vec<Option<BeefTx>> = std::mem::take(&mut self.txs).into_iter().map(Some).collect();
        self.txs = order.into_iter().filter_map(|i| slots[i].take()).collect();
    }

    // -----------------------------------------------------------------
    // Pruning
    // -----------------------------------------------------------------

    /// Atomic BEEF for `txid`: the target plus every ancestor needed to
    /// reach a proven transaction, with only the BUMPs those use.
    ///
    /// Fails with [`SpvError::MissingAncestor`] when a retained unproven
    /// transaction spends a parent the bundle does not carry.
    pub fn to_atomic(&self, txid: &Hash) -> Result<Beef, SpvError> {
        if self.find_transaction(txid)?.is_txid_only() {
            return Err(SpvError::InvalidBeef(format!(
                "atomic subject {} is carried as txid only",
                txid
            )));
        }

        let mut keep: HashSet<Hash> = HashSet::new();
        let mut stack = vec![*txid];
        while let Some(current) = stack.pop() {
            if !keep.insert(current) {
                continue;
            }
            let node = self.find_transaction(&current)?;
            if node.bump_index.is_some() || node.is_txid_only() {
                continue;
            }
            for parent in node.parent_txids() {
                if self.find_transaction(&parent).is_err() {
                    return Err(SpvError::MissingAncestor { txid: current, parent });
                }
                stack.push(parent);
            }
        }

        let mut remap = HashMap::new();
        let mut bumps = Vec::new();
        for (i, bump) in self.bumps.iter().enumerate() {
            let used = self.txs.iter().any(|t| t.bump_index == Some(i) && keep.contains(&t.txid));
            if used {
                remap.insert(i, bumps.len());
                bumps.push(bump.clone());
            }
        }

        let txs = self
            .txs
            .iter()
            .filter(|t| keep.contains(&t.txid))
            .map(|t| BeefTx {
                bump_index: t.bump_index.and_then(|i| remap.get(&i).copied()),
                ..t.clone()
            })
            .collect();

        let mut atomic = Beef { version: self.version, atomic_txid: Some(*txid), bumps, txs };
        atomic.sort_txs();
        Ok(atomic)
    }

    // -----------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------

    /// Every raw transaction is proven by its BUMP or spends only
    /// transactions that are themselves valid within the bundle, and BUMPs
    /// for the same block agree on the root.
    pub fn is_valid(&self, allow_txid_only: bool) -> bool {
        let mut valid: HashSet<Hash> = HashSet::new();
        for beef_tx in &self.txs {
            if beef_tx.is_txid_only() {
                if !allow_txid_only {
                    return false;
                }
                valid.insert(beef_tx.txid);
            } else if let Some(bump) = beef_tx.bump_index.and_then(|i| self.bumps.get(i)) {
                if !bump.contains(&beef_tx.txid) {
                    return false;
                }
                valid.insert(beef_tx.txid);
            }
        }

        loop {
            let before = valid.len();
            for beef_tx in &self.txs {
                if !valid.contains(&beef_tx.txid) && beef_tx.parent_txids().all(|p| valid.contains(&p)) {
                    valid.insert(beef_tx.txid);
                }
            }
            if valid.len() == before {
                break;
            }
        }
        if self.txs.iter().any(|t| !valid.contains(&t.txid)) {
            return false;
        }

        let mut roots: HashMap<u32, Hash> = HashMap::new();
        for bump in &self.bumps {
            let Ok(root) = bump_root(bump) else {
                return false;
            };
            if *roots.entry(bump.block_height).or_insert(root) != root {
                return false;
            }
        }
        true
    }

    /// [`Beef::is_valid`] plus a chain-tracker check of every BUMP root.
    pub fn verify(&self, chain_tracker: &dyn ChainTracker, allow_txid_only: bool) -> Result<bool, SpvError> {
        if !self.is_valid(allow_txid_only) {
            return Ok(false);
        }
        for bump in &self.bumps {
            if !chain_tracker.is_valid_root_for_height(&bump_root(bump)?, bump.block_height)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Root computed from the first flagged txid, falling back to any leaf.
fn bump_root(bump: &MerklePath) -> Result<Hash, SpvError> {
    bump.compute_root(bump.txids().first())
}

fn truncated(what: &'static str) -> impl Fn(bsv_primitives::PrimitivesError) -> SpvError {
    move |e| SpvError::InvalidBeef(format!("reading {}: {}", what, e))
}

fn read_raw_tx(reader: &mut BsvReader) -> Result<Transaction, SpvError> {
    Transaction::read_from(reader)
        .map_err(|e| SpvError::InvalidBeef(format!("reading transaction: {}", e)))
}

fn read_v1_tx(reader: &mut BsvReader) -> Result<BeefTx, SpvError> {
    let tx = read_raw_tx(reader)?;
    let bump_index = match reader.read_u8().map_err(truncated("bump flag"))? {
        0 => None,
        _ => Some(reader.read_varint().map_err(truncated("bump index"))?.value() as usize),
    };
    Ok(BeefTx::raw(tx, bump_index))
}

fn read_v2_tx(reader: &mut BsvReader) -> Result<BeefTx, SpvError> {
    let format = DataFormat::try_from(reader.read_u8().map_err(truncated("data format"))?)?;
    match format {
        DataFormat::TxIDOnly => Ok(BeefTx::txid_only(Hash::new(
            reader.read_32().map_err(truncated("txid"))?,
        ))),
        DataFormat::RawTxAndBumpIndex => {
            let index = reader.read_varint().map_err(truncated("bump index"))?.value() as usize;
            Ok(BeefTx::raw(read_raw_tx(reader)?, Some(index)))
        }
        DataFormat::RawTx => Ok(BeefTx::raw(read_raw_tx(reader)?, None)),
    }
}

struct LogDump<'a>(&'a Beef);

impl fmt::Display for LogDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let beef = self.0;
        if let Some(target) = &beef.atomic_txid {
            writeln!(f, "Atomic BEEF for {}", target)?;
        }
        writeln!(
            f,
            "BEEF with {} BUMPs and {} Transactions, isValid {}",
            beef.bumps.len(),
            beef.txs.len(),
            beef.is_valid(true)
        )?;
        for (i, bump) in beef.bumps.iter().enumerate() {
            writeln!(f, "  BUMP {}", i)?;
            writeln!(f, "    block: {}", bump.block_height)?;
            writeln!(f, "    txids: [")?;
            for txid in bump.txids() {
                writeln!(f, "      '{}',", txid)?;
            }
            writeln!(f, "    ]")?;
        }
        for (i, beef_tx) in beef.txs.iter().enumerate() {
            writeln!(f, "  TX {}", i)?;
            writeln!(f, "    txid: {}", beef_tx.txid)?;
            match &beef_tx.transaction {
                None => writeln!(f, "    txidOnly")?,
                Some(tx) => {
                    if let Some(index) = beef_tx.bump_index {
                        writeln!(f, "    bumpIndex: {}", index)?;
                    }
                    writeln!(f, "    rawTx length={}", tx.size())?;
                    if beef_tx.bump_index.is_none() {
                        writeln!(f, "    inputs: [")?;
                        for input in &tx.inputs {
                            writeln!(f, "      '{}',", input.outpoint)?;
                        }
                        writeln!(f, "    ]")?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRC62_HEX: &str = "0100beef01fe636d0c0007021400fe507c0c7aa754cef1f7889d5fd395cf1f785dd7de98eed895dbedfe4e5bc70d1502ac4e164f5bc16746bb0868404292ac8318bbac3800e4aad13a014da427adce3e010b00bc4ff395efd11719b277694cface5aa50d085a0bb81f613f70313acd28cf4557010400574b2d9142b8d28b61d88e3b2c3f44d858411356b49a28a4643b6d1a6a092a5201030051a05fc84d531b5d250c23f4f886f6812f9fe3f402d61607f977b4ecd2701c19010000fd781529d58fc2523cf396a7f25440b409857e7e221766c57214b1d38c7b481f01010062f542f45ea3660f86c013ced80534cb5fd4c19d66c56e7e8c5d4bf2d40acc5e010100b121e91836fd7cd5102b654e9f72f3cf6fdbfd0b161c53a9c54b12c841126331020100000001cd4e4cac3c7b56920d1e7655e7e260d31f29d9a388d04910f1bbd72304a79029010000006b483045022100e75279a205a547c445719420aa3138bf14743e3f42618e5f86a19bde14bb95f7022064777d34776b05d816daf1699493fcdf2ef5a5ab1ad710d9c97bfb5b8f7cef3641210263e2dee22b1ddc5e11f6fab8bcd2378bdd19580d640501ea956ec0e786f93e76ffffffff013e660000000000001976a9146bfd5c7fbe21529d45803dbcf0c87dd3c71efbc288ac0000000001000100000001ac4e164f5bc16746bb0868404292ac8318bbac3800e4aad13a014da427adce3e000000006a47304402203a61a2e931612b4bda08d541cfb980885173b8dcf64a3471238ae7abcd368d6402204cbf24f04b9aa2256d8901f0ed97866603d2be8324c2bfb7a37bf8fc90edd5b441210263e2dee22b1ddc5e11f6fab8bcd2378bdd19580d640501ea956ec0e786f93e76ffffffff013c660000000000001976a9146bfd5c7fbe21529d45803dbcf0c87dd3c71efbc288ac0000000000";

    const BEEF_SET: &str = "0200beef03fef1550d001102fd20c2009591fd79f7fb1fbd24c2fdc4911da930e1d7386f0216b6446b85eea29f978f1bfd21c202ac2a05abdae46fc2555c36a76035dedbf9fac4fc349eabffbd9d62ba440ffcb101fd116100cabeb714ea9a3f15a5e4f6138f6dd6b75bab32d8b40d178a0514e6e1e1b372f701fd8930007e04df7216a1d29bb8caabd1f78014b1b4f336eb6aee76bcf1797456ddc86b7501fd451800796afe5b113d8933f5eef2d180e72dc4b644fd76fb1243dfb791d9863702573701fd230c007a6edc003e02c429391cbf426816885731cb8054410599884eed508917a2f57c01fd100600eaa540de74506ed6abcb48e38cc544c53d373269271a7e6cf2143b7cc85d7ea401fd0903001e31aa04628b99d6cfa3e21fb4a7e773487ebc86a504e511eaff3f2176267b9401fd85010031e0d053497f85228b02879f69c4c7b43fb5abc3e0e47ea49a63853b117c9b5001c30083339d5a5b97ad77b74d3538678bb20ea7e61f8b02c24a625933eb496bebd3480160008ee445baec1613d591344a9915d77652f508e6442cd394626a3ff308bcb151f1013100f3f68f2a72e47bb41377e9e429daa496cd220bdcf702a36a209f9feba58d5552011900a01c52f4099bc7bdfea772ab03739bf009d72f24f68b5c4f8cc71a8c4da80804010d00c2ce2d5bfb9cbab9983ae1c871974f23a32c585d9b8440acc4ef5203c1d6c05401070072c7fc59a1717e90633f10d322e0f63272ae97c017d1efae04e4090abeeafac3010200a7aa5fa5576d1de6dd0e32d769592bc247be7bbd0b3e36e2d579fa1ec7d6ebce010000090cba670bea2e0d5c36e979e4cf9f79ad0874d734fb782fec2496d4c554e321010100d963646680643df73c34d7fa16f173595cf32a9ed6f64d2c8ee88a8af6b7bf52fedf590d001202fe66130200023275c6dde10d32d61af52b412b1e3956b5cd085605cd521778f11d53849fdb0cfe6713020000cd5e2298cf4d809c698c8adeeab66718e6b75b3d528bce74e6e01b984c736df901feb209010000736013454e087c89d813c99a043c9029cf2d427815c6a98ba3641c384ae52c4701fdd884007f742824bddca1582e4ded866d9609d9473397f8b86625376be74684f7fb947f01fd6d4200eb7f54ce4f920a3e4c7f96ef6b2d199c519df1b1286415581187ca608f3e47b801fd372100fa6c1c8cba3d3d5d030cd98eb91498cdffe70f0dad1000e123157d5dac22e22a01fd9a1000104c0294e478fbcac4e2325403afd86370c86043f295978b809004b2687a6c9a01fd4c08009ef5a5eaf16cab45a239c43852296ab323ca21faf256ab9768dd0a2f39970ec201fd2704006161cbd1755b66815eb69613b574920e9e836c8c3772aa2260ad3639848d520b01fd1202005e04b5afc0ea8d29dc22b611536832a2a2e7c860bbf4227ce0bdcc8a0e66284601fd0801009719f5f90e3937f3921045d202522fe315da1331acc3cce472c4b084d0debe65018500d79a1c3d45a3c41bf6526a9adbac2676159d2f3c753d7d3b6dba1dc3cbdd3c520143006b88b582d985bffc511556e471a6a20cfda2d41837245329f714214e009a3e48012000c1840dbdfc3014f1e912882b971c030fd21c0b023c01fe6fd7470d6d9bb2ab86011100f9c3de08d38588e225a5ee5334a3c03771a0b51318ca388dd1b5826951604d750109006e2b2e926c86214620d306a59522eee438a79157e9360cb76ee14a868fccc482010500d5c43ea372c432861db73ba0a6897fa29855e542a6ed910626dfb8954d94fa47010300d7863bafb5ca841ca0b13736fced1d492f0f741cb0a2beab1cafa517c878ae2c010000174ccda0879c20b85fa26d423deb0b34c5f2787127e244ccacfae39b5ba8fea7feeb590d001602fe46b3060002fa6ae8371111956f74412e3b1effcbd4fcb278124b6365b34c8cc20a5287bafffe47b306000011883eed76bdc7e7fb79efe23e3c50aa825ade46d79895de1a246e3d69a5b8cf01fea2590300009c92d7f67ac06e4bce0de4f18f438056f25138ee1a0cf61ed3a6d7f32261339b01fed0ac01000006178026214d61dc19c91cb5c08481f2f3daf03392c359de424cbd5d7135c5cf01fd69d6000174f6863438909d648fea32cdd65cbf457ab717f9be327d5d4352dbf157671e01fd356b0059536ea55010906b7071e36f78b20faaaede46a7f27ba4916dc1655836c73de701fd9b3500dee845c02c827dbcd862de359f5e6ad0ecca59213d9eb01896374d9efb7af9fd01fdcc1a00b22861b84b4537dfdaa8eb51957a51007af7836677ad14074601de6cd6c2871c01fd670d00591e76e7b07b26a6d7e940ec4f84497d9f3c7be111b15c336b24d83227db0c1001fdb20600f142d0ff9b2ddb7c21d8913f02adc7abc51fcdd5253154339450b87b59859aa601fd580300ce0307ff2027d405b8afa8a5c8834e9cc8bd073c4f463c3657562bbdb7843fe601fdad010027a3ce3a9829a3df0d9074099a6a3d76c81600a6a9c50f6cf857fb823c1a783901d700cca7689680c528f0a93fd9c980577016b37ce67ce75b1d728c4fa23008b1652b016a00b74bd3ab6c94f1216a803849afc254f37eea378c89167ff0686223db82767e3a013400434d5f48f733bb69fc5f0bd8238ffaec8d002951e6a1b52484fcc05819078372011b0053fef8153f4aed8aa8bdebeae0a6c1aa7712b84887fb565bcd9232fdd60fb0c0010c00009d9f21a9bc9e9d8c99aac9a1df47ffe02334fcb8bc8f3797d64c2564b3bf44010700838a284a4ee33c455b303e1eb23428b35d264b35c4f4b42bd6c68f1a7279f38801020042820e1ab5dbb77b0a6f266167b453f672d007d0c6eddc6229ce57c941f46c670100002c0da37e0453e7d01c810d2280a84792086b1fe1bc232e76ef6783f76c57757601010048746ad4d10a562bb53d2ed29438c9dfd0a6cacb78429277072e789d4d8dd8c101010091a52bf4a100e96dba15cbff933df60fcb26d95d6dd9b55fd5e450d5895e4526010100c202dcbdece72a45a1657ff7dbd979b031b1c8b839bc9a3b958683226644b736030100020000000140f6726035b03b90c1f770f0280444eeb041c45d026a8f4baaf00530bdc473a5020000006b483045022100ccdf467aa46d9570c4778f4e68491cc51dff4b815803d2406b6e8772d800f5ad02200ff8f11a59d207c734e9c68154dcef4023d75c37e661ab866b1d3e3ea77e6bda4121021cf99b6763736f48e6e063f99a43bfa82f15111ba0e0f9776280e6bd75d23af9ffffffff0377082800000000001976a91491b21f8856b862ff291ca0ac2ec924ba2419113788ac75330100000000001976a9144b5b285395052a61328b58c6594dd66aa6003d4988acf229f503000000001976a9148efcb6c55f5c299d48d0c74762dd811345c9093b88ac0000000001010200000001bcfe1adc5e99edb82c6a48f44cbae19bc0e5d31f9c8e4b3a92d6befb1cb2e510020000006a4730440220211655b505edd6fe9196aba77477dac5c9f638fe204243c09f1188a19164ac7f022035fb8640750515ca85df8197dec87a76db5c578f05b8ae645e30d8f70d429a324121028bf1be8161c50f98289df3ecd3185ed2273e9d448840232cf2f077f05e789c29ffffffff03d8000400000000001976a9144f427ee5f3099f0ac571f6b723a628e7b08fb64c88ac75330100000000001976a914f7cad87036406e5d3aef5d4a4d65887c76f9466788ac27db1004000000001976a9143219d1b6bd74f932dcb39a5f3b48cfde2b61cc0088ac0000000001020100000002e646efa607ff14299bc0b0cfaa65e035feb493cc440cb8abb8eb6225f8d4c1c4000000006b483045022100b410c4f82655f56fc8de4a622d3e4a8c662198de5ca8963989d70b85734986f502204fe884d99aa6ffd44bb01396b9f63bebcb7222b76e6e26c2bd60837ff555f1f8412103fda4ece7b0c9150872f8ef5241164b36a230fd9657bc43ca083d9e78bc0bcba6ffffffff3275c6dde10d32d61af52b412b1e3956b5cd085605cd521778f11d53849fdb0c000000006a473044022057f9d55ace1945866be0f83431867c58eda32d73ae3fdabed2d3424ebbe493530220553e286ae67bcaf49b0ea1d3163f41b1b3c91702a054e100c1e71ca4927f6dd8412103fda4ece7b0c9150872f8ef5241164b36a230fd9657bc43ca083d9e78bc0bcba6ffffffff04400d0300000000001976a9140e8338fa60e5391d54e99c734640e72461922d9988aca0860100000000001976a9140602787cc457f68c43581224fda6b9555aaab58e88ac10270000000000001976a91402cfbfc3931c7c1cf712574e80e75b1c2df14b2088acd5120000000000001976a914bd3dbab46060873e17ca754b0db0da4552c9a09388ac00000000";

    /// Payment bundle: two proven funding transactions, the payment and a
    /// transaction spending it.
    const PAYMENT_BEEF: &str = "0200beef02fe2257190001020000d528a81575845d517327bb6008084162faa1d7808a1c5fc8caaefee5528ca8500102267478fcd15a18ab54b0a225967af25d9b88a87fedbd10a902fab97949810f6dfe1457190002020202b484db892f137d09b52e39e6de3d8d5f1889910c1377f1382f23d0ab2859277d0301010000dfd8c32e8611b014421615f3a1f5c3a8ae003849b7a03a18cd6dcf9743cf6acb0401000100000001c2e7cdd48d1eda505aad919bcb22f5e2f34d5364e12d6958633b041209dcba81010000006b483045022100d605275c2a94df58abccb55e621bbca6c3b49ab7f72529c3722e7d39f1e90d6e02201a796d8ae398138cef88d0253579961ce362857ff1e906f8118cd8958c082f4d412102ce5244744264c00142827fbbb768b90cf02a92d3eec77834843c85b01615876bffffffff022a000000000000001976a9142037e5ee9d3dd5e35cc624d5f3de4533123132e188ac21020000000000001976a914a5b44ccddba277a74537a090581781dc182ce36488ac00000000010101000000033e11a4c9ac09a841d058939e48cbc0e12f6067c9273044b8b6d2914fbd341171000000006b483045022100d7842c4aba7f9e51b017a0573c45493bb42bc0add88c71019b70b386185887c4022034ee91c538e79266e3b3bb416d33e53461dcfb87eb84803cc838bc69cdf4dd3541210296261b41bb8bb4a88f9ff09a08c388ba1166bb9f6ec6c392ec5c6ab680581d74ffffffffc2e7cdd48d1eda505aad919bcb22f5e2f34d5364e12d6958633b041209dcba81000000006a473044022034b3ef17f6070bfced30ed2d033d5ddba3512912c1821883d7d92cce2f798506022066aea07c6e1e4429dd430a5d379c40ed8559f519e89ce30d1be566b1fe2abb9b412102b184e6620b66bbec9e1459b31c694d0d64b8cb6f88cd2d36061dda3759c5bf57ffffffff512bc260ce5d7890226d67daacb2e92d6917b873592e8670579f8c92b23c89fd000000006b4830450221009a4c5133b364fcba18eacf9a919d6110e3cc28491ce9a43760a2ea4254e87265022066fd5c26fd803894e8414928b70d7aad993d8a19603a6468e9a0a32004f563cd412103bf92dccc0c14bd54337dddc5a9eca59754dfede78721cb0ebe5f4551ac28b602ffffffff0166010000000000001976a9145a5f65105a758522dff47ca0b78be85c7ccd7a7588ac00000000000100000001267478fcd15a18ab54b0a225967af25d9b88a87fedbd10a902fab97949810f6d010000006b483045022100fdda2fce85570dcb4984e9617c8b1371d60c94101cb81706d65825f0e7fe7ab0022065ba34d22b60d99840b94fbf92321137da01f57e2fb6a04a94aed588a486a3c3412103b80196f0ce653201e4faeb90b2508dc7c81057d6c5777b7ce64aeac933080279ffffffff022a000000000000001976a91412bd7f92aff9bd738c644b5fce5e16cc585049b488acf6010000000000001976a914519914d1e955a7ec3835c5a95055e486cf6ae32088ac0000000000010000000219abff64fff782d133cc736ecae839fdeae9c49c19f321b33569c48c312cd1a2000000006b483045022100e506a6e836521c7548fe952acfb5be908ee54df696628ab29c6dfd2726d6fd0502203530601c17915929924cbf51706b00fc61d6f835344137330a158df6e8025370412103c341f45f6fd447f84d1c7dd625611ae18e0250793b9af3af5cf6679ca4345e38ffffffffb484db892f137d09b52e39e6de3d8d5f1889910c1377f1382f23d0ab2859277d000000006b483045022100923f65c63f50de5b8cae0bc914a72b43654de19d64967259ce35deeb90b3c70802207488c13e877fdd468049f31a6b88966a3990718d6ad8e8733979f808bb3ee201412102b8de49b75c9c57d3e96fb1a24f4c26898d03c6992369d29d127f04e9049f5a8bffffffff018f010000000000001976a9140704d1f8fca5a68088c58fccfa72277a06023d7c88ac00000000";

    fn h(s: &str) -> Hash {
        Hash::from_hex(s).unwrap()
    }

    const PROVEN_A: &str = "6d0f814979b9fa02a910bded7fa8889b5df27a9625a2b054ab185ad1fc787426";
    const PROVEN_B: &str = "7d275928abd0232f38f177130c9189185f8d3ddee6392eb5097d132f89db84b4";
    const PAYMENT: &str = "a2d12c318cc46935b321f3199cc4e9eafd39e8ca6e73cc33d182f7ff64ffab19";
    const SPEND: &str = "ef52d965929e97956a89240f76cee29a0ef1c3610e8934e801664c900d94f5b9";

    fn parents_precede_children(beef: &Beef) -> bool {
        beef.txs.iter().enumerate().all(|(i, t)| {
            t.parent_txids().all(|p| match beef.txs.iter().position(|x| x.txid == p) {
                Some(j) => j < i,
                None => true,
            })
        })
    }

    struct FixedTracker(bool);

    impl ChainTracker for FixedTracker {
        fn is_valid_root_for_height(&self, _root: &Hash, _height: u32) -> Result<bool, SpvError> {
            Ok(self.0)
        }

        fn current_height(&self) -> Result<u32, SpvError> {
            Ok(900_000)
        }
    }

    #[test]
    fn test_empty_bundles() {
        assert_eq!(Beef::new_v1().to_hex(), "0100beef0000");
        assert_eq!(Beef::new().to_hex(), "0200beef0000");
    }

    #[test]
    fn test_vectors_reserialize_byte_exact() {
        for hex_str in [BRC62_HEX, BEEF_SET, PAYMENT_BEEF] {
            let beef = Beef::from_hex(hex_str).unwrap();
            assert_eq!(beef.to_hex(), hex_str);
        }
    }

    #[test]
    fn test_parse_v1() {
        let beef = Beef::from_hex(BRC62_HEX).unwrap();
        assert_eq!(beef.version, BEEF_V1);
        assert_eq!(beef.bumps.len(), 1);
        assert_eq!(beef.txs.len(), 2);
        assert_eq!(beef.txs[0].data_format(), DataFormat::RawTxAndBumpIndex);
        assert_eq!(beef.txs[1].data_format(), DataFormat::RawTx);
        assert!(beef.is_valid(false));
    }

    #[test]
    fn test_parse_v2_set() {
        let beef = Beef::from_hex(BEEF_SET).unwrap();
        assert_eq!(beef.version, BEEF_V2);
        assert_eq!(beef.bumps.len(), 3);
        assert_eq!(beef.txs.len(), 3);
        assert!(beef.is_valid(false));
        let tx = beef
            .find_transaction(&h("b1fc0f44ba629dbdffab9e34fcc4faf9dbde3560a7365c55c26fe4daab052aac"))
            .unwrap();
        assert_eq!(tx.bump_index, Some(0));
    }

    #[test]
    fn test_find_missing_transaction() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let absent = h(&"11".repeat(32));
        assert!(matches!(
            beef.find_transaction(&absent),
            Err(SpvError::TransactionNotFound(t)) if t == absent
        ));
    }

    #[test]
    fn test_to_atomic_stops_at_proven_ancestors() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        assert!(beef.is_valid(false));

        let atomic = beef.to_atomic(&h(PAYMENT)).unwrap();
        assert_eq!(atomic.atomic_txid, Some(h(PAYMENT)));
        assert_eq!(atomic.txs.len(), 2);
        assert_eq!(atomic.bumps.len(), 1);
        assert_eq!(atomic.txs[0].txid(), h(PROVEN_A));
        assert_eq!(atomic.txs[0].bump_index, Some(0));
        assert_eq!(atomic.txs[1].txid(), h(PAYMENT));
        assert!(atomic.is_valid(false));

        let bytes = atomic.to_bytes();
        assert_eq!(hex::encode(&bytes[..4]), "01010101");
        let parsed = Beef::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.atomic_txid, Some(h(PAYMENT)));
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_to_atomic_keeps_whole_unproven_ancestry() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let atomic = beef.to_atomic(&h(SPEND)).unwrap();
        assert_eq!(atomic.txs.len(), 4);
        assert_eq!(atomic.bumps.len(), 2);
        assert_eq!(atomic.txs.last().map(BeefTx::txid), Some(h(SPEND)));
        assert!(parents_precede_children(&atomic));
        assert!(atomic.is_valid(false));
    }

    #[test]
    fn test_to_atomic_of_proven_transaction() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let atomic = beef.to_atomic(&h(PROVEN_B)).unwrap();
        assert_eq!(atomic.txs.len(), 1);
        assert_eq!(atomic.bumps.len(), 1);
        assert_eq!(atomic.bumps[0].block_height, beef.bumps[1].block_height);
        assert_eq!(atomic.txs[0].bump_index, Some(0));
    }

    #[test]
    fn test_to_atomic_fails_on_missing_parent() {
        let mut beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        beef.txs.retain(|t| t.txid() != h(PROVEN_A));
        assert!(!beef.is_valid(false));
        match beef.to_atomic(&h(PAYMENT)) {
            Err(SpvError::MissingAncestor { txid, parent }) => {
                assert_eq!(txid, h(PAYMENT));
                assert_eq!(parent, h(PROVEN_A));
            }
            other => panic!("expected MissingAncestor, got {:?}", other.map(|b| b.to_hex())),
        }
    }

    #[test]
    fn test_find_atomic_transaction_attaches_sources() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let tx = beef.find_atomic_transaction(&h(SPEND)).unwrap();
        assert_eq!(tx.inputs[0].source_satoshis(), Some(42));
        assert_eq!(tx.inputs[1].source_satoshis(), Some(358));
        assert_eq!(tx.total_input_satoshis().unwrap(), 400);
        assert_eq!(tx.tx_id(), h(SPEND));
    }

    #[test]
    fn test_sort_restores_dependency_order() {
        let mut beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        beef.txs.reverse();
        assert!(!parents_precede_children(&beef));
        beef.sort_txs();
        assert!(parents_precede_children(&beef));
        assert_eq!(beef.txs.len(), 4);
    }

    #[test]
    fn test_merge_beef_into_empty() {
        let source = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let mut merged = Beef::new();
        merged.merge_beef(&source).unwrap();
        assert_eq!(merged.bumps.len(), 2);
        assert_eq!(merged.txs.len(), 4);
        assert!(merged.is_valid(false));

        // Merging again adds nothing.
        merged.merge_beef(&source).unwrap();
        assert_eq!(merged.bumps.len(), 2);
        assert_eq!(merged.txs.len(), 4);
    }

    #[test]
    fn test_merge_bump_links_existing_transaction() {
        let source = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let proven = source.find_transaction(&h(PROVEN_B)).unwrap().transaction().unwrap().clone();

        let mut beef = Beef::new();
        beef.merge_transaction(proven);
        assert!(!beef.is_valid(false));
        let index = beef.merge_bump(&source.bumps[1]).unwrap();
        assert_eq!(beef.txs[0].bump_index, Some(index));
        assert!(beef.is_valid(false));
    }

    #[test]
    fn test_txid_only_forces_v2() {
        let mut beef = Beef::from_hex(BRC62_HEX).unwrap();
        beef.merge_txid_only(h(&"22".repeat(32)));
        assert!(!beef.is_valid(false));
        assert!(beef.is_valid(true));
        let bytes = beef.to_bytes();
        assert_eq!(hex::encode(&bytes[..4]), "0200beef");
        let back = Beef::from_bytes(&bytes).unwrap();
        assert!(back.txs[2].is_txid_only());
    }

    #[test]
    fn test_verify_consults_tracker() {
        let beef = Beef::from_hex(BEEF_SET).unwrap();
        assert!(beef.verify(&FixedTracker(true), false).unwrap());
        assert!(!beef.verify(&FixedTracker(false), false).unwrap());
    }

    #[test]
    fn test_log_string() {
        let beef = Beef::from_hex(PAYMENT_BEEF).unwrap();
        let log = beef.to_log_string();
        assert!(log.starts_with("BEEF with 2 BUMPs and 4 Transactions, isValid true"));
        assert!(log.contains(&format!("txid: {}", SPEND)));
        assert!(log.contains(&format!("'{}.0',", PAYMENT)));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Beef::from_bytes(&[]).is_err());
        assert!(Beef::from_bytes(&[0xff, 0xff, 0xff, 0xff]).is_err());
        let padded = format!("{}00", BRC62_HEX);
        assert!(Beef::from_hex(&padded).is_err());

        // Atomic prefix naming a transaction the bundle lacks.
        let mut atomic = Beef::from_hex(BRC62_HEX).unwrap().to_atomic(
            &h("157428aee67d11123203735e4c540fa1bdab3b36d5882c6f8c5ff79f07d20d1c"),
        )
        .unwrap();
        atomic.atomic_txid = Some(h(&"33".repeat(32)));
        assert!(matches!(
            Beef::from_bytes(&atomic.to_bytes()),
            Err(SpvError::InvalidBeef(_))
        ));
    }
}
