use std::rc::Rc;

use config::{CaseMaterial, Color, Colorway, Layout, LegendStyle, State, SwatchKind};
use glam::dvec2;
use log::{debug, info, warn};
use web_time::Instant;

use crate::{
    case::{build_case, CaseSettings},
    finish::finish_map,
    geometry::IndexedMesh,
    keys::{Key, KeySet},
    legend::{CacheStats, LegendCache, LegendKey, MaterialSet, SharedLegendCache, Texture},
    Error,
};

/// The parts of a keyboard scene affected by a state change.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// The case mesh was rebuilt.
    pub case_geometry: bool,
    /// The case color or finish changed.
    pub case_material: bool,
    /// The keys were rebuilt.
    pub keys_geometry: bool,
    /// The key or switch materials changed.
    pub keys_material: bool,
}

impl Changes {
    /// Returns changes affecting every part of the scene.
    #[must_use]
    pub fn all() -> Self {
        Self {
            case_geometry: true,
            case_material: true,
            keys_geometry: true,
            keys_material: true,
        }
    }

    /// Returns the changes required to go from one state to another.
    #[must_use]
    pub fn between(old: &State, new: &State) -> Self {
        let layout = old.case.layout != new.case.layout;
        let legends = old.keys != new.keys;
        let case_shape = old.case.style != new.case.style
            || old.case.bezel != new.case.bezel
            || old.case.corner_radius != new.case.corner_radius
            || old.case.bevel != new.case.bevel;

        Self {
            case_geometry: layout || case_shape,
            case_material: old.case.primary_color != new.case.primary_color
                || old.case.material != new.case.material,
            keys_geometry: layout || legends,
            keys_material: layout || legends || old.colorways != new.colorways,
        }
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the union of both changes.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            case_geometry: self.case_geometry || other.case_geometry,
            case_material: self.case_material || other.case_material,
            keys_geometry: self.keys_geometry || other.keys_geometry,
            keys_material: self.keys_material || other.keys_material,
        }
    }
}

/// The case of a keyboard scene.
#[derive(Clone, Debug)]
pub struct CaseModel {
    /// The case mesh using a single flat color material.
    pub mesh: Rc<IndexedMesh>,
    /// The number of holes punched into the case.
    pub hole_count: usize,
    /// The flat case color.
    pub color: Color,
    /// The surface finish.
    pub material: CaseMaterial,
    /// The finish map modulating the case color, if any.
    pub finish: Option<Rc<Texture>>,
}

/// A key of a keyboard scene with its materials.
#[derive(Clone, Debug)]
pub struct KeyModel {
    /// The key with its meshes.
    pub key: Key,
    /// The swatch the key is colored with.
    pub swatch: SwatchKind,
    /// The keycap textures.
    pub materials: MaterialSet,
}

/// The CPU side of a keyboard scene built from a state.
///
/// Applying a new state only rebuilds the parts affected by the change. Legend textures come
/// from a cache shared by all keyboards of the thread (see [`LegendCache::shared`]), which is
/// only cleared when the legend style changes or on [`Keyboard::force_rebuild`].
pub struct Keyboard {
    state: State,
    layout: Layout,
    colorway: Colorway,
    case: CaseModel,
    keys: Vec<KeyModel>,
    cache: SharedLegendCache,
}

impl Keyboard {
    /// Builds a keyboard scene from the given state using the shared legend cache.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the state refers to an unknown or invalid layout or colorway.
    pub fn from_state(state: &State) -> Result<Self, Error> {
        Self::with_cache(state, LegendCache::shared())
    }

    /// Builds a keyboard scene from the given state, taking legend textures from the given
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the state refers to an unknown or invalid layout or colorway.
    pub fn with_cache(state: &State, cache: SharedLegendCache) -> Result<Self, Error> {
        let layout = state.layout()?;
        let colorway = state.colorways.resolve_active()?;

        let (mesh, hole_count) = timed("case", || build_case_mesh(&layout, state))?;
        let case = CaseModel {
            mesh,
            hole_count,
            color: state.case.primary_color,
            material: state.case.material,
            finish: case_finish(state.case.material),
        };
        let key_set = timed("keys", || KeySet::build(&layout))?;
        let keys = dress_keys(
            key_set.keys,
            state.keys.legend_primary_style,
            &colorway,
            &mut cache.borrow_mut(),
        )?;

        Ok(Self {
            state: state.clone(),
            layout,
            colorway,
            case,
            keys,
            cache,
        })
    }

    /// Applies a new state, rebuilding only what changed.
    ///
    /// The keyboard is left untouched if an error occurs.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the new state refers to an unknown or invalid layout or colorway.
    pub fn apply(&mut self, state: &State) -> Result<Changes, Error> {
        let changes = Changes::between(&self.state, state);
        if changes.is_empty() {
            return Ok(changes);
        }

        let layout = if state.case.layout == self.state.case.layout {
            self.layout.clone()
        } else {
            state.layout()?
        };
        let colorway = if changes.keys_material {
            state.colorways.resolve_active()?
        } else {
            self.colorway.clone()
        };

        let mut case = self.case.clone();
        if changes.case_geometry {
            (case.mesh, case.hole_count) = timed("case", || build_case_mesh(&layout, state))?;
        }
        if changes.case_material {
            case.color = state.case.primary_color;
            if case.material != state.case.material {
                case.material = state.case.material;
                case.finish = case_finish(state.case.material);
            }
        }

        let keys = if changes.keys_geometry {
            if self.state.keys.legend_primary_style != state.keys.legend_primary_style {
                self.cache.borrow_mut().clear();
            }
            let key_set = timed("keys", || KeySet::build(&layout))?;
            Some(dress_keys(
                key_set.keys,
                state.keys.legend_primary_style,
                &colorway,
                &mut self.cache.borrow_mut(),
            )?)
        } else if changes.keys_material {
            debug!("Updating key materials for colorway `{}`", colorway.label);
            Some(dress_keys(
                self.keys.iter().map(|model| model.key.clone()).collect(),
                state.keys.legend_primary_style,
                &colorway,
                &mut self.cache.borrow_mut(),
            )?)
        } else {
            None
        };

        self.state = state.clone();
        self.layout = layout;
        self.colorway = colorway;
        self.case = case;
        if let Some(keys) = keys {
            self.keys = keys;
        }

        Ok(changes)
    }

    /// Rebuilds the whole scene from the current state, clearing the legend cache so all
    /// textures are rasterized again.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the scene cannot be rebuilt.
    pub fn force_rebuild(&mut self) -> Result<Changes, Error> {
        let cache = Rc::clone(&self.cache);
        cache.borrow_mut().clear();
        *self = Self::with_cache(&self.state, cache)?;

        Ok(Changes::all())
    }

    /// Returns the state the scene was built from.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the layout of the scene.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the active colorway.
    #[must_use]
    pub fn colorway(&self) -> &Colorway {
        &self.colorway
    }

    /// Returns the case.
    #[must_use]
    pub fn case(&self) -> &CaseModel {
        &self.case
    }

    /// Returns the keys in layout order.
    #[must_use]
    pub fn keys(&self) -> &[KeyModel] {
        &self.keys
    }

    /// Returns the color of all switch housings.
    #[must_use]
    pub fn switch_color(&self) -> Color {
        self.colorway.switch
    }

    /// Returns the statistics of the legend cache.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }
}

/// Runs a rebuild step and logs its duration.
fn timed<T>(part: &str, build: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    let start = Instant::now();
    let result = build()?;
    info!("Rebuilt {part} in {:?}", start.elapsed());

    Ok(result)
}

/// Builds the case mesh, returning it with its hole count.
fn build_case_mesh(layout: &Layout, state: &State) -> Result<(Rc<IndexedMesh>, usize), Error> {
    let case = build_case(layout, state.case.style, &CaseSettings::from(&state.case))?;

    Ok((Rc::new(case.mesh), case.hole_count))
}

/// Returns the finish map of the case, falling back to the flat color if it is unavailable.
fn case_finish(material: CaseMaterial) -> Option<Rc<Texture>> {
    match finish_map(material) {
        Ok(map) => map.map(Rc::new),
        Err(error) => {
            warn!("Using flat case color, finish map unavailable: {error}");
            None
        }
    }
}

/// Resolves the materials of all keys through the cache.
fn dress_keys(
    keys: Vec<Key>,
    style: LegendStyle,
    colorway: &Colorway,
    cache: &mut LegendCache,
) -> Result<Vec<KeyModel>, Error> {
    keys.into_iter()
        .map(|key| {
            let instance = &key.instance;
            let swatch = colorway.swatch_kind(&instance.code);
            let legend = LegendKey::new(
                &instance.code,
                style,
                colorway.swatch_for(&instance.code).background,
                dvec2(instance.unit_width, instance.unit_height),
                instance.legend_offset,
            );
            let materials = cache.material_set(legend)?;

            Ok(KeyModel {
                key,
                swatch,
                materials,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use config::CaseStyle;

    use super::*;

    fn keyboard() -> Keyboard {
        Keyboard::from_state(&State::default()).unwrap()
    }

    #[test]
    fn default_state_builds_all_parts() {
        let keyboard = keyboard();

        assert_eq!(keyboard.keys().len(), 87);
        assert!(keyboard.case().hole_count > 0);
        assert!(keyboard.case().finish.is_none());
        assert_eq!(keyboard.case().color, State::default().case.primary_color);
    }

    #[test]
    fn unchanged_state_changes_nothing() {
        let mut keyboard = keyboard();
        let mesh = keyboard.case().mesh.clone();

        let changes = keyboard.apply(&State::default()).unwrap();

        assert!(changes.is_empty());
        assert!(Rc::ptr_eq(&mesh, &keyboard.case().mesh));
    }

    #[test]
    fn color_change_keeps_geometry() {
        let mut keyboard = keyboard();
        let mesh = keyboard.case().mesh.clone();
        let mut state = State::default();
        state.case.primary_color = Color::rgb(255, 0, 0);

        let changes = keyboard.apply(&state).unwrap();

        assert_eq!(
            changes,
            Changes {
                case_material: true,
                ..Changes::default()
            }
        );
        assert!(Rc::ptr_eq(&mesh, &keyboard.case().mesh));
        assert_eq!(keyboard.case().color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn style_change_rebuilds_case_only() {
        let mut keyboard = keyboard();
        let keycap = keyboard.keys()[0].key.keycap.clone();
        let mut state = State::default();
        state.case.style = CaseStyle::Sharp;

        let changes = keyboard.apply(&state).unwrap();

        assert!(changes.case_geometry && !changes.keys_geometry);
        assert!(Rc::ptr_eq(&keycap, &keyboard.keys()[0].key.keycap));
    }

    #[test]
    fn layout_change_rebuilds_everything() {
        let mut keyboard = keyboard();
        let mut state = State::default();
        state.case.layout = "60".to_owned();

        let changes = keyboard.apply(&state).unwrap();

        assert!(changes.case_geometry && changes.keys_geometry && changes.keys_material);
        assert_eq!(keyboard.keys().len(), 61);
        assert_eq!(keyboard.layout().name, "60");
    }

    #[test]
    fn material_change_adds_finish_map() {
        let mut keyboard = keyboard();
        let mut state = State::default();
        state.case.material = CaseMaterial::Brushed;

        let changes = keyboard.apply(&state).unwrap();

        assert!(changes.case_material && !changes.case_geometry);
        assert!(keyboard.case().finish.is_some());
    }

    #[test]
    fn legend_style_change_clears_cache() {
        let mut keyboard = keyboard();
        let texture = keyboard.keys()[0].materials.top.clone();
        let mut state = State::default();
        state.keys.legend_primary_style = LegendStyle::Gmk;

        let changes = keyboard.apply(&state).unwrap();

        assert!(changes.keys_geometry);
        assert!(!Rc::ptr_eq(&texture, &keyboard.keys()[0].materials.top));
        assert!(keyboard.cache_stats().misses > 0);
    }

    #[test]
    fn unknown_layout_leaves_keyboard_untouched() {
        let mut keyboard = keyboard();
        let mut state = State::default();
        state.case.layout = "missing".to_owned();

        assert!(matches!(
            keyboard.apply(&state),
            Err(Error::Config(config::Error::UnknownLayout(_)))
        ));
        assert_eq!(keyboard.state(), &State::default());
        assert_eq!(keyboard.layout().name, "tkl");
    }

    #[test]
    fn force_rebuild_rasterizes_again() {
        let mut keyboard = keyboard();
        let texture = keyboard.keys()[0].materials.top.clone();

        assert_eq!(keyboard.force_rebuild().unwrap(), Changes::all());
        assert!(!Rc::ptr_eq(&texture, &keyboard.keys()[0].materials.top));
        assert_eq!(*texture, *keyboard.keys()[0].materials.top);
    }

    #[test]
    fn keyboards_share_legend_textures() {
        let (first, second) = (keyboard(), keyboard());

        assert!(Rc::ptr_eq(
            &first.keys()[0].materials.top,
            &second.keys()[0].materials.top
        ));
    }

    #[test]
    fn separate_caches_rasterize_separately() {
        let first = keyboard();
        let own_cache = Rc::new(RefCell::new(LegendCache::new()));
        let second = Keyboard::with_cache(&State::default(), Rc::clone(&own_cache)).unwrap();

        assert!(!Rc::ptr_eq(
            &first.keys()[0].materials.top,
            &second.keys()[0].materials.top
        ));
        assert_eq!(own_cache.borrow().stats(), second.cache_stats());
    }

    #[test]
    fn union_of_changes() {
        let case = Changes {
            case_geometry: true,
            ..Changes::default()
        };
        let keys = Changes {
            keys_material: true,
            ..Changes::default()
        };

        let union = case.union(keys);
        assert!(union.case_geometry && union.keys_material);
        assert!(!union.case_material && !union.keys_geometry);
    }
}
