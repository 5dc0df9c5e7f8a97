//! Layer, item, and catalog data structures.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Stable identifier of a layer.
pub type LayerId = u64;

/// Identifier of an item, unique across the whole catalog.
pub type ItemId = u64;

/// Maximum length of a layer name.
const MAX_LAYER_NAME_LEN: usize = 64;

/// A single trait variant belonging to a layer.
///
/// # Validation
///
/// - `rarity` must lie within `[0, 100]` when set
/// - `count` is only meaningful when the owning layer is in exact-count mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Catalog-wide unique identifier
    pub id: ItemId,
    /// Display name (e.g., "Red Head", "Pirate-Hat")
    pub name: String,
    /// Percentage weight within the owning layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<f64>,
    /// Desired total occurrences across a full export
    #[serde(default)]
    pub count: u32,
}

impl Item {
    /// Creates a new item without rarity or count.
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rarity: None,
            count: 0,
        }
    }

    /// Sets the rarity weight for this item.
    #[must_use]
    pub const fn with_rarity(mut self, rarity: f64) -> Self {
        self.rarity = Some(rarity);
        self
    }

    /// Sets the exact-count target for this item.
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// A named set of mutually exclusive trait variants with a stacking position.
///
/// # Validation
///
/// - Name must be non-empty, max 64 characters
/// - Item ids must be unique within the layer
/// - `z_index` is unique within a [`TraitCatalog`] and kept contiguous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Unique identifier for this layer (stable across renames/reorders)
    pub id: LayerId,
    /// Human-readable name (e.g., "Head", "Background")
    pub name: String,
    /// Trait variants in display order
    pub items: Vec<Item>,
    /// Stacking order, 0 is the bottom layer
    #[serde(default)]
    pub z_index: usize,
    /// Whether per-item `count` quotas apply to this layer
    #[serde(default)]
    pub exact_count_mode: bool,
}

impl Layer {
    /// Creates a new layer with the given items.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, too long, or item ids repeat.
    pub fn new(id: LayerId, name: impl Into<String>, items: Vec<Item>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;

        for (index, item) in items.iter().enumerate() {
            if items[..index].iter().any(|other| other.id == item.id) {
                anyhow::bail!("Layer '{}' contains duplicate item id {}", name, item.id);
            }
        }

        Ok(Self {
            id,
            name,
            items,
            z_index: 0,
            exact_count_mode: false,
        })
    }

    /// Validates layer name.
    fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            anyhow::bail!("Layer name cannot be empty");
        }

        if name.len() > MAX_LAYER_NAME_LEN {
            anyhow::bail!(
                "Layer name '{}' exceeds maximum length of {} characters (got {})",
                name,
                MAX_LAYER_NAME_LEN,
                name.len()
            );
        }

        Ok(())
    }

    /// Enables or disables exact-count mode.
    #[must_use]
    pub const fn with_exact_count(mut self, enabled: bool) -> Self {
        self.exact_count_mode = enabled;
        self
    }

    /// Gets a reference to the item with the given id.
    #[must_use]
    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Gets a mutable reference to the item with the given id.
    pub fn item_mut(&mut self, item_id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    /// Whether any item carries an explicit rarity weight.
    #[must_use]
    pub fn has_rarity(&self) -> bool {
        self.items.iter().any(|item| item.rarity.is_some())
    }

    /// Sum of per-item `count` values.
    #[must_use]
    pub fn count_total(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.count)).sum()
    }

    /// Updates the layer name with validation.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        Self::validate_name(&name)?;
        self.name = name;
        Ok(())
    }

    /// Sets the rarity of one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is outside `[0, 100]` or the item is unknown.
    pub fn set_rarity(&mut self, item_id: ItemId, rarity: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&rarity) {
            anyhow::bail!("Rarity must be between 0 and 100 (got {rarity})");
        }
        let layer_name = self.name.clone();
        let item = self
            .item_mut(item_id)
            .ok_or_else(|| anyhow::anyhow!("Item {item_id} not found in layer '{layer_name}'"))?;
        item.rarity = Some(rarity);
        Ok(())
    }

    /// Sets the exact-count target of one item.
    pub fn set_count(&mut self, item_id: ItemId, count: u32) -> Result<()> {
        let layer_name = self.name.clone();
        let item = self
            .item_mut(item_id)
            .ok_or_else(|| anyhow::anyhow!("Item {item_id} not found in layer '{layer_name}'"))?;
        item.count = count;
        Ok(())
    }

    /// Sets whether exact-count quotas apply to this layer.
    pub const fn set_exact_count_mode(&mut self, enabled: bool) {
        self.exact_count_mode = enabled;
    }
}

/// Immutable-per-generation view of all layers.
///
/// The set of z-indices is always the contiguous range `[0, len - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitCatalog {
    layers: Vec<Layer>,
}

impl TraitCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Builds a catalog from layers, keeping their relative z-order.
    ///
    /// # Errors
    ///
    /// Returns an error if layer ids or item ids collide.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        let mut catalog = Self::new();
        for layer in layers {
            catalog.push_layer(layer)?;
        }
        catalog.normalize_z_indices();
        Ok(catalog)
    }

    fn push_layer(&mut self, layer: Layer) -> Result<()> {
        if self.layer(layer.id).is_some() {
            anyhow::bail!("Layer id {} is already in use", layer.id);
        }
        for item in &layer.items {
            if let Some(owner) = self.owner_of(item.id) {
                anyhow::bail!(
                    "Item id {} of layer '{}' is already used by layer '{}'",
                    item.id,
                    layer.name,
                    owner.name
                );
            }
        }
        self.layers.push(layer);
        Ok(())
    }

    /// Adds a layer on top of the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer has no items or its ids collide.
    pub fn add_layer(&mut self, mut layer: Layer) -> Result<()> {
        if layer.items.is_empty() {
            anyhow::bail!("Layer '{}' has no items", layer.name);
        }
        layer.z_index = self.layers.len();
        self.push_layer(layer)
    }

    /// Removes a layer and compacts the remaining z-indices.
    pub fn remove_layer(&mut self, layer_id: LayerId) -> Result<Layer> {
        let index = self
            .layers
            .iter()
            .position(|layer| layer.id == layer_id)
            .ok_or_else(|| anyhow::anyhow!("Layer {layer_id} not found"))?;
        let removed = self.layers.remove(index);
        self.normalize_z_indices();
        Ok(removed)
    }

    /// Moves a layer to a new stacking position and compacts z-indices.
    pub fn move_layer(&mut self, layer_id: LayerId, new_z_index: usize) -> Result<()> {
        let mut ordered: Vec<LayerId> = self.layers_by_z().iter().map(|layer| layer.id).collect();
        let current = ordered
            .iter()
            .position(|id| *id == layer_id)
            .ok_or_else(|| anyhow::anyhow!("Layer {layer_id} not found"))?;
        let id = ordered.remove(current);
        ordered.insert(new_z_index.min(ordered.len()), id);

        for layer in &mut self.layers {
            if let Some(z) = ordered.iter().position(|id| *id == layer.id) {
                layer.z_index = z;
            }
        }
        Ok(())
    }

    /// Re-assigns z-indices so they form `[0, len - 1]` without gaps.
    pub fn normalize_z_indices(&mut self) {
        let mut order: Vec<usize> = (0..self.layers.len()).collect();
        order.sort_by_key(|&index| (self.layers[index].z_index, index));
        for (z, index) in order.into_iter().enumerate() {
            self.layers[index].z_index = z;
        }
    }

    /// All layers in insertion order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layers sorted bottom to top.
    #[must_use]
    pub fn layers_by_z(&self) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self.layers.iter().collect();
        layers.sort_by_key(|layer| layer.z_index);
        layers
    }

    /// Layers that have at least one item, bottom to top.
    #[must_use]
    pub fn non_empty_layers(&self) -> Vec<&Layer> {
        self.layers_by_z()
            .into_iter()
            .filter(|layer| !layer.items.is_empty())
            .collect()
    }

    /// Gets a layer by id.
    #[must_use]
    pub fn layer(&self, layer_id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == layer_id)
    }

    /// Gets a mutable layer by id.
    pub fn layer_mut(&mut self, layer_id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id == layer_id)
    }

    /// Gets an item of a specific layer.
    #[must_use]
    pub fn item(&self, layer_id: LayerId, item_id: ItemId) -> Option<&Item> {
        self.layer(layer_id).and_then(|layer| layer.item(item_id))
    }

    /// Finds the layer owning an item id.
    #[must_use]
    pub fn owner_of(&self, item_id: ItemId) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.items.iter().any(|item| item.id == item_id))
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the catalog has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of distinct combinations the catalog can produce.
    ///
    /// Product of item counts across non-empty layers, saturating at `u64::MAX`.
    /// An empty catalog has a capacity of zero.
    #[must_use]
    pub fn theoretical_max(&self) -> u64 {
        let layers = self.non_empty_layers();
        if layers.is_empty() {
            return 0;
        }
        layers
            .iter()
            .fold(1u64, |acc, layer| acc.saturating_mul(layer.items.len() as u64))
    }
}
