use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoType {
    State,      // Highest-level entity
    Tract,      // Tract -> State
    Group,      // Group -> Tract
    Block,      // Lowest-level entity
}

impl GeoType {
    /// Length of the GEOID prefix that identifies an entity at this level.
    pub fn prefix_len(self) -> usize {
        match self {
            GeoType::State => 2,
            GeoType::Tract => 11,
            GeoType::Group => 12,
            GeoType::Block => 15,
        }
    }

    /// Level name used in output file names.
    pub fn level_name(self) -> &'static str {
        match self {
            GeoType::State => "state",
            GeoType::Tract => "tract",
            GeoType::Group => "blockgroup",
            GeoType::Block => "block",
        }
    }
}

/// Stable key for any entity across levels.
/// Keep the original GEOID text (with leading zeros) but avoid repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoId {
    pub ty: GeoType,
    pub id: Arc<str>, // e.g., "31" for state, "310010001001001" for block
}

impl GeoId {
    pub fn new(ty: GeoType, id: &str) -> Self {
        Self { ty, id: Arc::from(id) }
    }

    #[inline]
    pub fn id(&self) -> &str { &self.id }

    /// Returns a new `GeoId` corresponding to the higher-level `GeoType`
    /// by truncating this GeoId's string to the correct prefix length.
    pub fn to_parent(&self, parent_ty: GeoType) -> GeoId {
        let len = parent_ty.prefix_len();

        // If the id is shorter than expected, just take the full id.
        let prefix: Arc<str> = Arc::from(&self.id[..self.id.len().min(len)]);

        GeoId { ty: parent_ty, id: prefix }
    }
}

/// Human-readable label for a known NLCD class code.
///
/// Unknown codes return `None` and are passed through the tabulation
/// untouched; new raster editions may introduce codes we don't know yet.
pub fn nlcd_label(code: u8) -> Option<&'static str> {
    Some(match code {
        11 => "Open Water",
        12 => "Perennial Ice/Snow",
        21 => "Developed, Open Space",
        22 => "Developed, Low Intensity",
        23 => "Developed, Medium Intensity",
        24 => "Developed, High Intensity",
        31 => "Barren Land",
        41 => "Deciduous Forest",
        42 => "Evergreen Forest",
        43 => "Mixed Forest",
        51 => "Dwarf Scrub",
        52 => "Shrub/Scrub",
        71 => "Grassland/Herbaceous",
        72 => "Sedge/Herbaceous",
        73 => "Lichens",
        74 => "Moss",
        81 => "Pasture/Hay",
        82 => "Cultivated Crops",
        90 => "Woody Wetlands",
        95 => "Emergent Herbaceous Wetlands",
        _ => return None,
    })
}
