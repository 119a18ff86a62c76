//! Client-held shopping cart. Lives on the ordering device, never on the
//! server; the server first sees its lines at checkout. Persistence is a
//! pluggable side effect so a kiosk build can write a file while tests stay
//! in memory.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::FornadaResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    /// Already inclusive of the flavor/option additions chosen at selection
    /// time, on top of the product's effective (promo-aware) price.
    pub unit_price: Decimal,
    pub quantity: u32,
    pub flavor: Option<String>,
    pub chosen_option: Option<String>,
    pub observation: Option<String>,
}

impl CartLine {
    fn merges_with(&self, other: &CartLine) -> bool {
        self.product_id == other.product_id
            && self.chosen_option == other.chosen_option
            && self.observation == other.observation
    }
}

pub trait CartStorage {
    fn persist(&mut self, lines: &[CartLine]) -> FornadaResult<()>;
    fn restore(&self) -> FornadaResult<Vec<CartLine>>;
}

/// No-op restore, keeps everything in memory. Used by tests and as the
/// fallback when no storage path is configured.
#[derive(Default)]
pub struct MemoryStorage {
    lines: Vec<CartLine>,
}

impl CartStorage for MemoryStorage {
    fn persist(&mut self, lines: &[CartLine]) -> FornadaResult<()> {
        self.lines = lines.to_vec();
        Ok(())
    }

    fn restore(&self) -> FornadaResult<Vec<CartLine>> {
        Ok(self.lines.clone())
    }
}

/// JSON file persistence so the cart survives a restart of the ordering
/// device.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CartStorage for JsonFileStorage {
    fn persist(&mut self, lines: &[CartLine]) -> FornadaResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(lines)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn restore(&self) -> FornadaResult<Vec<CartLine>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        // A corrupt cart file is not worth failing over; start empty.
        Ok(serde_json::from_str(&content).unwrap_or_default())
    }
}

pub struct Cart<S: CartStorage> {
    lines: Vec<CartLine>,
    storage: S,
}

impl<S: CartStorage> Cart<S> {
    pub fn new(storage: S) -> FornadaResult<Self> {
        let lines = storage.restore()?;
        Ok(Self { lines, storage })
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Merges into an existing line only when product, chosen option and
    /// observation all match exactly; merging increments quantity and never
    /// overwrites the existing line's price or selections.
    pub fn add_item(&mut self, item: CartLine) -> FornadaResult<()> {
        match self.lines.iter_mut().find(|line| line.merges_with(&item)) {
            Some(existing) => existing.quantity += item.quantity,
            None => self.lines.push(item),
        }
        self.storage.persist(&self.lines)
    }

    pub fn increase(&mut self, line_id: Uuid) -> FornadaResult<()> {
        if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == line_id) {
            line.quantity += 1;
        }
        self.storage.persist(&self.lines)
    }

    /// Decrementing to zero removes the line.
    pub fn decrease(&mut self, line_id: Uuid) -> FornadaResult<()> {
        if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == line_id) {
            line.quantity = line.quantity.saturating_sub(1);
        }
        self.lines.retain(|l| l.quantity > 0);
        self.storage.persist(&self.lines)
    }

    pub fn remove(&mut self, line_id: Uuid) -> FornadaResult<()> {
        self.lines.retain(|l| l.line_id != line_id);
        self.storage.persist(&self.lines)
    }

    /// Empties the cart; called after a successful checkout.
    pub fn clear(&mut self) -> FornadaResult<()> {
        self.lines.clear();
        self.storage.persist(&self.lines)
    }

    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum()
    }

    pub fn count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
