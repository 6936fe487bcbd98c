//! Symbol management: create, edit and read back Symbols.
//!
//! Every edit that names a registry component (munge step, aggregation
//! method, validator) is checked against the registries before it is
//! stored, so unknown identifiers fail here rather than mid-cache.

use std::sync::Arc;

use crate::domain::{
    DataKind, Feed, FeedDraft, FeedState, IndexKind, IndexValue, Kwargs, OrfDraft, OrfEntry,
    OrfKind, Series, Symbol, ValidatorSpec,
};
use crate::error::PipelineError;
use crate::factory::Registries;
use crate::handling::{FeedHandleConfig, HandleDefaults, SymbolHandleConfig};
use crate::storage::{Storage, StorageError};
use crate::table::AlignedTable;

pub struct SymbolManager {
    storage: Arc<dyn Storage>,
    registries: Arc<Registries>,
    defaults: HandleDefaults,
}

impl SymbolManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        registries: Arc<Registries>,
        defaults: HandleDefaults,
    ) -> Self {
        Self {
            storage,
            registries,
            defaults,
        }
    }

    pub fn defaults(&self) -> &HandleDefaults {
        &self.defaults
    }

    /// A fresh Symbol carrying this manager's handle defaults.
    pub fn blank(&self, name: &str) -> Symbol {
        Symbol::new(name, &self.defaults)
    }

    // ─── Symbols ─────────────────────────────────────────────────────

    pub fn create(&self, symbol: Symbol, overwrite: bool) -> Result<Symbol, PipelineError> {
        self.registries.validate_symbol(&symbol)?;
        self.storage.create_symbol(&symbol, overwrite)?;
        tracing::info!(symbol = %symbol.name, overwrite, "symbol created");
        Ok(symbol)
    }

    pub fn get(&self, name: &str) -> Result<Symbol, PipelineError> {
        Ok(self.storage.load_symbol(name)?)
    }

    pub fn exists(&self, name: &str) -> Result<bool, PipelineError> {
        Ok(self.storage.exists(name)?)
    }

    pub fn delete(&self, name: &str) -> Result<(), PipelineError> {
        self.storage.delete_symbol(name)?;
        tracing::info!(symbol = name, "symbol deleted");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.storage.symbol_names()?)
    }

    fn edit(&self, name: &str, f: impl FnOnce(&mut Symbol)) -> Result<Symbol, PipelineError> {
        let mut symbol = self.storage.load_symbol(name)?;
        f(&mut symbol);
        self.registries.validate_symbol(&symbol)?;
        self.storage.save_symbol(&symbol)?;
        Ok(symbol)
    }

    pub fn set_description(&self, name: &str, description: &str) -> Result<Symbol, PipelineError> {
        self.edit(name, |s| s.description = description.to_string())
    }

    pub fn set_units(&self, name: &str, units: &str) -> Result<Symbol, PipelineError> {
        self.edit(name, |s| s.units = units.to_string())
    }

    pub fn set_agg_method(&self, name: &str, method: &str) -> Result<Symbol, PipelineError> {
        self.edit(name, |s| s.agg_method = method.to_string())
    }

    /// Change the index kind. The stored table is recreated on the next
    /// cache call because its schema no longer matches.
    pub fn set_index_kind(&self, name: &str, kind: IndexKind) -> Result<Symbol, PipelineError> {
        self.edit(name, |s| s.index.kind = kind)
    }

    pub fn set_data_kind(&self, name: &str, kind: DataKind) -> Result<Symbol, PipelineError> {
        self.edit(name, |s| s.data_kind = kind)
    }

    pub fn update_handle(
        &self,
        name: &str,
        config: &SymbolHandleConfig,
    ) -> Result<Symbol, PipelineError> {
        let mut symbol = self.storage.load_symbol(name)?;
        config.apply_to(&mut symbol.handle, &self.defaults)?;
        self.storage.save_symbol(&symbol)?;
        Ok(symbol)
    }

    /// Declare a validator, returning its vid.
    pub fn add_validator(
        &self,
        name: &str,
        validator: &str,
        args: Kwargs,
    ) -> Result<u32, PipelineError> {
        self.registries.validators.build(validator, &args)?;
        let mut vid = 0;
        self.edit(name, |s| {
            vid = s.next_vid();
            s.validators.push(ValidatorSpec {
                vid,
                validator: validator.to_string(),
                args,
            });
        })?;
        Ok(vid)
    }

    // ─── Feeds ───────────────────────────────────────────────────────

    pub fn feeds(&self, name: &str) -> Result<Vec<Feed>, PipelineError> {
        Ok(self.storage.load_feeds(name)?)
    }

    pub fn add_feed(&self, name: &str, draft: FeedDraft) -> Result<Feed, PipelineError> {
        self.registries.munges.validate(&draft.munging)?;
        let feed = self.storage.add_feed(name, draft, &self.defaults)?;
        tracing::info!(feed = %feed.owner(), source = %feed.source.source_type, "feed added");
        Ok(feed)
    }

    pub fn delete_feed(&self, name: &str, fnum: u32) -> Result<(), PipelineError> {
        Ok(self.storage.delete_feed(name, fnum)?)
    }

    fn edit_feed(
        &self,
        name: &str,
        fnum: u32,
        f: impl FnOnce(&mut Feed) -> Result<(), PipelineError>,
    ) -> Result<Feed, PipelineError> {
        let mut feed = self
            .storage
            .load_feeds(name)?
            .into_iter()
            .find(|feed| feed.fnum == fnum)
            .ok_or_else(|| StorageError::FeedNotFound {
                symbol: name.to_string(),
                fnum,
            })?;
        f(&mut feed)?;
        self.storage.update_feed(&feed)?;
        Ok(feed)
    }

    pub fn set_feed_state(
        &self,
        name: &str,
        fnum: u32,
        state: FeedState,
    ) -> Result<Feed, PipelineError> {
        self.edit_feed(name, fnum, |feed| {
            feed.state = state;
            Ok(())
        })
    }

    pub fn update_feed_handle(
        &self,
        name: &str,
        fnum: u32,
        config: &FeedHandleConfig,
    ) -> Result<Feed, PipelineError> {
        self.edit_feed(name, fnum, |feed| {
            config.apply_to(&mut feed.handle, &self.defaults)?;
            Ok(())
        })
    }

    // ─── Overrides and failsafes ─────────────────────────────────────

    /// Parse a raw index value in the Symbol's index kind.
    pub fn parse_index(&self, name: &str, raw: &str) -> Result<IndexValue, PipelineError> {
        let symbol = self.storage.load_symbol(name)?;
        Ok(symbol.index.kind.parse(raw)?)
    }

    fn append(
        &self,
        name: &str,
        kind: OrfKind,
        mut draft: OrfDraft,
    ) -> Result<OrfEntry, PipelineError> {
        let symbol = self.storage.load_symbol(name)?;
        draft.index = symbol.index.kind.coerce(draft.index)?;
        let entry = self.storage.append_orf(name, kind, draft)?;
        tracing::info!(
            symbol = name,
            kind = %kind,
            seq = entry.seq,
            index = %entry.index,
            value = entry.value,
            "datapoint logged"
        );
        Ok(entry)
    }

    pub fn add_override(&self, name: &str, draft: OrfDraft) -> Result<OrfEntry, PipelineError> {
        self.append(name, OrfKind::Override, draft)
    }

    pub fn add_failsafe(&self, name: &str, draft: OrfDraft) -> Result<OrfEntry, PipelineError> {
        self.append(name, OrfKind::FailSafe, draft)
    }

    // ─── Reading back ────────────────────────────────────────────────

    /// The full aligned table as last cached.
    pub fn raw_data(&self, name: &str) -> Result<AlignedTable, PipelineError> {
        let stored = self
            .storage
            .read_final_table(name)?
            .ok_or_else(|| StorageError::NoTable(name.to_string()))?;
        Ok(AlignedTable::from_storage(&stored)?)
    }

    /// Index and final value as last cached.
    pub fn final_series(&self, name: &str) -> Result<Series, PipelineError> {
        Ok(self.raw_data(name)?.final_series(name))
    }

    /// Multi-line summary of a Symbol's definition.
    pub fn describe(&self, name: &str) -> Result<String, PipelineError> {
        let symbol = self.storage.load_symbol(name)?;
        let feeds = self.storage.load_feeds(name)?;
        let overrides = self.storage.load_overrides(name)?;
        let failsafes = self.storage.load_failsafes(name)?;

        let mut lines = vec![format!("Symbol: {}", symbol.name)];
        if !symbol.description.is_empty() {
            lines.push(format!("  {}", symbol.description));
        }
        lines.push(format!(
            "  index {} ({}), data {}, units '{}', aggregation {}",
            symbol.index.name, symbol.index.kind, symbol.data_kind, symbol.units, symbol.agg_method
        ));
        lines.push(format!("  {} feeds:", feeds.len()));
        for feed in &feeds {
            let steps: Vec<&str> = feed.steps().iter().map(|s| s.method.as_str()).collect();
            lines.push(format!(
                "    {} [{}] {} munging: [{}]",
                feed.column_name(),
                feed.state,
                feed.source.source_type,
                steps.join(", ")
            ));
        }
        for v in &symbol.validators {
            lines.push(format!("  validator {} {}", v.vid, v.validator));
        }
        lines.push(format!(
            "  {} overrides, {} failsafes",
            overrides.len(),
            failsafes.len()
        ));
        Ok(lines.join("\n"))
    }
}

impl std::fmt::Debug for SymbolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolManager")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
