use std::collections::BTreeMap;
use std::sync::Arc;
use vessel_common::Rgba;

/// Identifier of a substance definition in a [`SubstanceCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubstanceId(pub u32);

impl std::fmt::Display for SubstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "substance#{}", self.0)
    }
}

/// An immutable substance definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Substance {
    pub id: SubstanceId,
    pub name: String,
    /// Colour this substance contributes to a mixture.
    pub color: Rgba,
    /// Volume units occupied by one mole.
    pub molar_volume: f32,
}

impl Substance {
    pub fn new(id: SubstanceId, name: impl Into<String>, color: Rgba, molar_volume: f32) -> Self {
        Self {
            id,
            name: name.into(),
            color,
            molar_volume,
        }
    }
}

/// Errors from catalog registration and lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} is already registered")]
    Duplicate(SubstanceId),
    #[error("molar volume of {id} must be positive and finite, got {molar_volume}")]
    InvalidMolarVolume { id: SubstanceId, molar_volume: f32 },
    #[error("unknown substance {0}")]
    UnknownSubstance(SubstanceId),
}

/// Registry of substance definitions shared by every ledger in a session.
///
/// Definitions are handed out as `Arc<Substance>` so ledgers can hold them
/// without copying names and colours on every transfer.
#[derive(Debug, Clone, Default)]
pub struct SubstanceCatalog {
    substances: BTreeMap<SubstanceId, Arc<Substance>>,
}

impl SubstanceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Ids are unique and molar volume must be positive.
    pub fn register(&mut self, substance: Substance) -> Result<Arc<Substance>, CatalogError> {
        if !(substance.molar_volume.is_finite() && substance.molar_volume > 0.0) {
            return Err(CatalogError::InvalidMolarVolume {
                id: substance.id,
                molar_volume: substance.molar_volume,
            });
        }
        if self.substances.contains_key(&substance.id) {
            return Err(CatalogError::Duplicate(substance.id));
        }
        let substance = Arc::new(substance);
        self.substances.insert(substance.id, Arc::clone(&substance));
        Ok(substance)
    }

    pub fn get(&self, id: SubstanceId) -> Result<Arc<Substance>, CatalogError> {
        self.substances
            .get(&id)
            .cloned()
            .ok_or(CatalogError::UnknownSubstance(id))
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Substance>> {
        self.substances.values().find(|s| s.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.substances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substances.is_empty()
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Substance>> {
        self.substances.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Substance {
        Substance::new(SubstanceId(1), "water", Rgba::rgb(0.2, 0.4, 0.9), 1.0)
    }

    #[test]
    fn register_and_lookup() {
        let mut catalog = SubstanceCatalog::new();
        let w = catalog.register(water()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(SubstanceId(1)).unwrap(), w);
        assert_eq!(catalog.by_name("water").unwrap().id, SubstanceId(1));
        assert!(catalog.by_name("milk").is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut catalog = SubstanceCatalog::new();
        catalog.register(water()).unwrap();
        assert_eq!(
            catalog.register(water()).unwrap_err(),
            CatalogError::Duplicate(SubstanceId(1))
        );
    }

    #[test]
    fn non_positive_molar_volume_rejected() {
        let mut catalog = SubstanceCatalog::new();
        let bad = Substance::new(SubstanceId(2), "void", Rgba::BLACK, 0.0);
        assert!(matches!(
            catalog.register(bad),
            Err(CatalogError::InvalidMolarVolume { .. })
        ));
        let nan = Substance::new(SubstanceId(3), "nan", Rgba::BLACK, f32::NAN);
        assert!(catalog.register(nan).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn unknown_lookup_is_error() {
        let catalog = SubstanceCatalog::new();
        assert_eq!(
            catalog.get(SubstanceId(9)).unwrap_err(),
            CatalogError::UnknownSubstance(SubstanceId(9))
        );
    }

    #[test]
    fn iteration_is_id_ordered() {
        let mut catalog = SubstanceCatalog::new();
        for id in [5, 1, 3] {
            catalog
                .register(Substance::new(SubstanceId(id), format!("s{id}"), Rgba::WHITE, 1.0))
                .unwrap();
        }
        let ids: Vec<u32> = catalog.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
