//! On-disk persistence for [`crate::LocalStore`].
//!
//! Keyed collections are written as whole JSON snapshots (`<name>.json`),
//! replaced atomically through a temp file. Trades go to a JSON Lines file in
//! append mode:
//! - each line is a complete record
//! - a torn write only loses that line
//! - an updated trade is appended again and the later line wins on load

use crate::collections::{Collection, Collections};
use crate::error::{StoreError, StoreResult};
use o2_core::Trade;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TRADES_FILE: &str = "trades.jsonl";

pub(crate) struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Open `dir` (created if missing) and load every collection from it.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<(Self, Collections)> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let persistence = Self { dir };

        let mut collections = Collections::new();
        for account in persistence.load_snapshot(Collection::TradingAccounts)? {
            collections.insert_account(account);
        }
        for session in persistence.load_snapshot(Collection::Sessions)? {
            collections.insert_session(session);
        }
        for key in persistence.load_snapshot::<o2_core::SessionKeyRecord>(Collection::SessionKeys)? {
            collections.session_keys.insert(key.id.clone(), key);
        }
        for config in
            persistence.load_snapshot::<o2_core::StrategyConfigRecord>(Collection::StrategyConfigs)?
        {
            collections.strategy_configs.insert(config.id.clone(), config);
        }
        for terms in persistence.load_snapshot::<o2_core::TermsAcceptance>(Collection::Terms)? {
            collections.terms.insert(terms.owner_address.clone(), terms);
        }
        for trade in persistence.load_trades()? {
            collections.insert_trade(trade);
        }

        info!(
            dir = %persistence.dir.display(),
            accounts = collections.trading_accounts.len(),
            sessions = collections.sessions.len(),
            strategy_configs = collections.strategy_configs.len(),
            trades = collections.trades.len(),
            "Opened file store"
        );
        Ok((persistence, collections))
    }

    fn snapshot_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn load_snapshot<T: DeserializeOwned>(&self, collection: Collection) -> StoreResult<Vec<T>> {
        let path = self.snapshot_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            collection: collection.name().to_string(),
            reason: e.to_string(),
        })
    }

    /// Replace the snapshot of `collection` with `records`.
    pub fn write_snapshot<'a, T, I>(&self, collection: Collection, records: I) -> StoreResult<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let records: Vec<&T> = records.into_iter().collect();
        let path = self.snapshot_path(collection);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(collection = collection.name(), records = records.len(), "Wrote snapshot");
        Ok(())
    }

    fn load_trades(&self) -> StoreResult<Vec<Trade>> {
        let path = self.dir.join(TRADES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut trades = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Trade>(&line) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(line = line_no + 1, ?e, "Skipping corrupt trade line"),
            }
        }
        Ok(trades)
    }

    /// Append one trade line.
    pub fn append_trade(&self, trade: &Trade) -> StoreResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(TRADES_FILE))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", serde_json::to_string(trade)?)?;
        writer.flush()?;
        Ok(())
    }
}
