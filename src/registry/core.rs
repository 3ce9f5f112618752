use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canvas::InstanceId;
use crate::error::{CounterTokenError, EntityKind, Result};
use crate::geometry::{BoundingBox, Point, Size};
use crate::presence::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Active,
    Removing,
}

/// Placement of one group on one surface. `instance_ids` is grid order:
/// index 0 sits at the anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceState {
    #[serde(default)]
    pub instance_ids: Vec<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Geometry applied to groups created without explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenDefaults {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub spacing_x: f64,
    pub spacing_y: f64,
}

impl Default for TokenDefaults {
    fn default() -> Self {
        Self {
            left: 30.0,
            top: 30.0,
            width: 30.0,
            height: 30.0,
            spacing_x: 5.0,
            spacing_y: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGroup {
    pub name: String,
    pub counter_name: String,
    pub image_source: String,
    pub width: f64,
    pub height: f64,
    pub spacing_x: f64,
    pub spacing_y: f64,
    pub anchor: Point,
    #[serde(default)]
    pub lifecycle_state: LifecycleState,
    #[serde(default)]
    pub per_surface: BTreeMap<SurfaceId, SurfaceState>,
    /// Registration order; collision checks visit other groups by it.
    #[serde(default)]
    pub seq: u64,
    /// Last counter value delivered to this group.
    #[serde(skip)]
    pub observed_value: Option<u64>,
}

impl TokenGroup {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Centre-to-centre step between neighbouring instances.
    pub fn pitch(&self) -> (f64, f64) {
        (self.width + self.spacing_x, self.height + self.spacing_y)
    }

    pub fn is_removing(&self) -> bool {
        self.lifecycle_state == LifecycleState::Removing
    }

    pub fn instance_name(&self, index: usize) -> String {
        format!("{} {}", self.name, index)
    }

    /// Index encoded in an object name of the form `"<group> <index>"`.
    pub fn instance_index(&self, object_name: &str) -> Option<usize> {
        let suffix = object_name.strip_prefix(self.name.as_str())?;
        let digits = suffix.strip_prefix(char::is_whitespace)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn surface(&self, surface: &str) -> Option<&SurfaceState> {
        self.per_surface.get(surface)
    }

    pub fn surface_mut(&mut self, surface: &str) -> Option<&mut SurfaceState> {
        self.per_surface.get_mut(surface)
    }
}

/// Creation request for a token group; unset geometry falls back to defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenGroupSpec {
    pub name: String,
    pub counter_name: String,
    pub image_source: String,
    pub size: Option<Size>,
    pub spacing: Option<(f64, f64)>,
    pub anchor: Option<Point>,
}

impl TokenGroupSpec {
    pub fn new(
        name: impl Into<String>,
        counter_name: impl Into<String>,
        image_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            counter_name: counter_name.into(),
            image_source: image_source.into(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn with_spacing(mut self, x: f64, y: f64) -> Self {
        self.spacing = Some((x, y));
        self
    }

    pub fn with_anchor(mut self, left: f64, top: f64) -> Self {
        self.anchor = Some(Point::new(left, top));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CounterTokenError::invalid("token group name is required"));
        }
        if self.counter_name.trim().is_empty() {
            return Err(CounterTokenError::invalid("counter name is required"));
        }
        if self.image_source.trim().is_empty() {
            return Err(CounterTokenError::invalid("image source is required"));
        }
        if let Some(size) = self.size {
            if !(size.width > 0.0 && size.height > 0.0) {
                return Err(CounterTokenError::invalid("token size must be positive"));
            }
        }
        if let Some((x, y)) = self.spacing {
            if !(x >= 0.0 && y >= 0.0) {
                return Err(CounterTokenError::invalid("token spacing must not be negative"));
            }
        }
        Ok(())
    }
}

/// Library image URLs are rewritten to their `thumb` variant; anything else
/// passes through untouched.
pub fn normalize_image_source(source: &str) -> String {
    const VARIANTS: [&str; 4] = ["thumb", "med", "original", "max"];
    let Some(images_at) = source.rfind("/images/") else {
        return source.to_string();
    };
    let tail_start = images_at + "/images/".len();
    let tail = &source[tail_start..];
    let last = VARIANTS
        .iter()
        .filter_map(|variant| tail.rfind(variant).map(|at| (at, *variant)))
        .max_by_key(|(at, _)| *at);
    match last {
        Some((at, variant)) => {
            let start = tail_start + at;
            format!("{}thumb{}", &source[..start], &source[start + variant.len()..])
        }
        None => source.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct TokenRegistry {
    groups: BTreeMap<String, TokenGroup>,
    next_seq: u64,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, spec: TokenGroupSpec, defaults: &TokenDefaults) -> Result<&TokenGroup> {
        spec.validate()?;
        let name = spec.name.trim().to_string();
        if self.groups.contains_key(&name) {
            return Err(CounterTokenError::DuplicateName {
                kind: EntityKind::TokenGroup,
                name,
            });
        }
        let size = spec
            .size
            .unwrap_or(Size::new(defaults.width, defaults.height));
        let (spacing_x, spacing_y) = spec
            .spacing
            .unwrap_or((defaults.spacing_x, defaults.spacing_y));
        self.next_seq += 1;
        let group = TokenGroup {
            name: name.clone(),
            counter_name: spec.counter_name.trim().to_string(),
            image_source: normalize_image_source(spec.image_source.trim()),
            width: size.width,
            height: size.height,
            spacing_x,
            spacing_y,
            anchor: spec
                .anchor
                .unwrap_or(Point::new(defaults.left, defaults.top)),
            lifecycle_state: LifecycleState::Active,
            per_surface: BTreeMap::new(),
            seq: self.next_seq,
            observed_value: None,
        };
        Ok(self.groups.entry(name).or_insert(group))
    }

    pub fn get(&self, name: &str) -> Option<&TokenGroup> {
        self.groups.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TokenGroup> {
        self.groups.get_mut(name)
    }

    pub fn require(&self, name: &str) -> Result<&TokenGroup> {
        self.get(name)
            .ok_or_else(|| CounterTokenError::group_not_found(name))
    }

    pub fn require_mut(&mut self, name: &str) -> Result<&mut TokenGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| CounterTokenError::group_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<TokenGroup> {
        self.groups
            .remove(name)
            .ok_or_else(|| CounterTokenError::group_not_found(name))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in registration order.
    pub fn in_order(&self) -> Vec<&TokenGroup> {
        let mut groups: Vec<&TokenGroup> = self.groups.values().collect();
        groups.sort_by_key(|group| group.seq);
        groups
    }

    pub fn names(&self) -> Vec<String> {
        self.in_order()
            .into_iter()
            .map(|group| group.name.clone())
            .collect()
    }

    /// Names of groups bound to `counter`, in registration order.
    pub fn bound_to(&self, counter: &str) -> Vec<String> {
        self.in_order()
            .into_iter()
            .filter(|group| group.counter_name == counter)
            .map(|group| group.name.clone())
            .collect()
    }

    pub fn to_persisted(&self) -> BTreeMap<String, TokenGroup> {
        self.groups.clone()
    }

    pub fn from_persisted(groups: BTreeMap<String, TokenGroup>) -> Self {
        let next_seq = groups.values().map(|group| group.seq).max().unwrap_or(0);
        let mut registry = Self {
            groups: BTreeMap::new(),
            next_seq,
        };
        let mut ordered: Vec<(String, TokenGroup)> = groups.into_iter().collect();
        ordered.sort_by_key(|(_, group)| group.seq);
        for (name, mut group) in ordered {
            if group.seq == 0 {
                registry.next_seq += 1;
                group.seq = registry.next_seq;
            }
            group.name = name.clone();
            registry.groups.insert(name, group);
        }
        registry
    }
}
