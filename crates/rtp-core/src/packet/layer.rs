//! Simulcast/SVC layer identification
//!
//! A packet's layer is either known directly or resolved from a dependency
//! descriptor (AV1 RTP extension) against the last template dependency
//! structure the sender transmitted. The structure is only sent periodically, so
//! whoever resolves layers has to keep the last one around.

use serde::{Deserialize, Serialize};

/// Spatial/temporal layer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Spatial layer id
    pub spatial_layer_id: u8,
    /// Temporal layer id
    pub temporal_layer_id: u8,
}

impl LayerInfo {
    /// Create a layer info
    pub fn new(spatial_layer_id: u8, temporal_layer_id: u8) -> Self {
        Self {
            spatial_layer_id,
            temporal_layer_id,
        }
    }

    /// Combined id, spatial in the high byte
    pub fn id(&self) -> u16 {
        (u16::from(self.spatial_layer_id) << 8) | u16::from(self.temporal_layer_id)
    }

    /// Inverse of [`Self::id`]
    pub fn from_id(id: u16) -> Self {
        Self::new((id >> 8) as u8, id as u8)
    }
}

/// One frame template of a dependency structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameTemplate {
    /// Spatial layer id of frames using this template
    pub spatial_layer_id: u8,
    /// Temporal layer id of frames using this template
    pub temporal_layer_id: u8,
}

/// Template dependency structure carried by some dependency descriptors
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateDependencyStructure {
    /// Template id of the first template
    pub template_id_offset: u8,
    /// Templates in id order
    pub templates: Vec<FrameTemplate>,
}

impl TemplateDependencyStructure {
    /// Template ids live in a 6-bit space
    const TEMPLATE_ID_SPACE: u16 = 64;

    /// Resolve a template id to the layer it describes
    pub fn layer_for(&self, template_id: u8) -> Option<LayerInfo> {
        let index = (u16::from(template_id) + Self::TEMPLATE_ID_SPACE
            - u16::from(self.template_id_offset) % Self::TEMPLATE_ID_SPACE)
            % Self::TEMPLATE_ID_SPACE;
        self.templates
            .get(usize::from(index))
            .map(|template| LayerInfo::new(template.spatial_layer_id, template.temporal_layer_id))
    }
}

/// Dependency descriptor present on a single packet
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    /// First packet of a frame
    pub start_of_frame: bool,
    /// Last packet of a frame
    pub end_of_frame: bool,
    /// Frame dependency template id
    pub template_id: u8,
    /// Frame number
    pub frame_number: u16,
    /// Structure attached to this packet (key frames and periodic refreshes)
    pub template_structure: Option<TemplateDependencyStructure>,
    /// Active decode target bitmask, when signalled
    pub active_decode_targets: Option<u32>,
}
