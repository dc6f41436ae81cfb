//! Scene driver: orthographic view, resize handling and the zoom lock.
//!
//! The view is a flat orthographic projection whose vertical half-extent is
//! `base_half_height / external_scale`; the horizontal extent follows the
//! viewport aspect.  Screen coordinates are logical pixels with the origin
//! at the top-left, `y` pointing down.
//!
//! # Zoom lock
//! Zooming scales the tree root about its pivot (the trunk base).  So the
//! base never slides across the screen, [`TreeZoom`] captures the pivot's
//! screen position on first use and, after every scale change, moves the
//! root so the pivot projects back onto that exact spot.  A resize releases
//! the lock; the next zoom captures it afresh.
//!
//! The lock runs through a [`ScreenMapping`].  A live camera tagged
//! `InkCamera` is used through [`CameraView`], so a host camera that pans
//! or uses its own projection still pins the base.  [`OrthoView`] is the
//! fallback while no such camera has a computed viewport (headless apps,
//! the first frame); it assumes a camera centred on [`OrthoView::center`].

use bevy::prelude::{
    Assets, Camera, GlobalTransform, Mesh, Resource, StandardMaterial, Transform, Vec2, Vec3,
    World,
};

/// Bounds applied by [`TreeZoom::set_zoom`].
pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// Error raised once at startup when the host lacks a required capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A resource the scene draws with is not registered.
    MissingCapability(&'static str),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::MissingCapability(what) => write!(
                f,
                "rendering capability {what} is missing; add the asset/PBR plugins before InkwoodPlugin"
            ),
        }
    }
}

impl std::error::Error for SceneError {}

/// Verify the world can hold line meshes and their materials.
pub fn check_render_capabilities(world: &World) -> Result<(), SceneError> {
    if !world.contains_resource::<Assets<Mesh>>() {
        return Err(SceneError::MissingCapability("Assets<Mesh>"));
    }
    if !world.contains_resource::<Assets<StandardMaterial>>() {
        return Err(SceneError::MissingCapability("Assets<StandardMaterial>"));
    }
    Ok(())
}

/// Static layout of the scene.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SceneConfig {
    /// Vertical half-extent of the view in world units at external scale 1.
    pub base_half_height: f32,
    /// World height of the tree base before the host's offset.
    pub base_tree_y: f32,
    /// Viewport assumed until the first window size is known.
    pub default_viewport: [f32; 2],
    /// Spawn an orthographic camera; disable when the host owns the camera.
    pub spawn_camera: bool,
    /// Distance of the spawned camera from the drawing plane.
    pub camera_distance: f32,
    /// Depth step pushing each bleed layer behind the previous one.
    pub layer_depth_step: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            base_half_height: 10.0,
            base_tree_y: -8.5,
            default_viewport: [1280.0, 720.0],
            spawn_camera: true,
            camera_distance: 10.0,
            layer_depth_step: 0.01,
        }
    }
}

/// Host-adjustable view parameters, polled like a style sheet.
///
/// Changing either field is handled as a resize.
#[derive(Resource, Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ViewportSettings {
    /// Overall scale of the drawing; non-positive or non-finite means 1.
    pub external_scale: f32,
    /// Vertical offset of the tree base added to `base_tree_y`.
    pub tree_offset_y: f32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            external_scale: 1.0,
            tree_offset_y: 0.0,
        }
    }
}

/// Replace unusable external scales with 1.
#[inline]
pub fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Orthographic world↔screen mapping for one viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrthoView {
    /// Viewport size in logical pixels.
    pub viewport: Vec2,
    /// Vertical half-extent in world units.
    pub half_height: f32,
    /// World point at the centre of the screen.
    pub center: Vec2,
}

impl OrthoView {
    pub fn new(viewport: Vec2, base_half_height: f32, external_scale: f32) -> Self {
        Self {
            viewport: viewport.max(Vec2::ONE),
            half_height: base_half_height / sanitize_scale(external_scale),
            center: Vec2::ZERO,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.x / self.viewport.y
    }

    /// Half-width and half-height of the visible world rectangle.
    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.half_height * self.aspect(), self.half_height)
    }

    /// World point → screen pixel.
    pub fn project(&self, world: Vec2) -> Vec2 {
        let ndc = (world - self.center) / self.half_extents();
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc.y) * 0.5 * self.viewport.y,
        )
    }

    /// Screen pixel → world point on the drawing plane.
    pub fn unproject(&self, screen: Vec2) -> Vec2 {
        let ndc = Vec2::new(
            screen.x / self.viewport.x * 2.0 - 1.0,
            1.0 - screen.y / self.viewport.y * 2.0,
        );
        self.center + ndc * self.half_extents()
    }
}

/// World↔screen pair the zoom lock is computed with.
///
/// Screen coordinates are logical pixels, origin top-left, `y` down.
/// `None` means the mapping is not available yet.
pub trait ScreenMapping {
    fn project(&self, world: Vec2) -> Option<Vec2>;
    fn unproject(&self, screen: Vec2) -> Option<Vec2>;
}

impl ScreenMapping for OrthoView {
    fn project(&self, world: Vec2) -> Option<Vec2> {
        Some(OrthoView::project(self, world))
    }

    fn unproject(&self, screen: Vec2) -> Option<Vec2> {
        Some(OrthoView::unproject(self, screen))
    }
}

/// A Bevy camera's own projection, on the `z = 0` drawing plane.
pub struct CameraView<'a> {
    pub camera: &'a Camera,
    pub transform: &'a GlobalTransform,
}

impl ScreenMapping for CameraView<'_> {
    fn project(&self, world: Vec2) -> Option<Vec2> {
        self.camera
            .world_to_viewport(self.transform, world.extend(0.0))
            .ok()
    }

    fn unproject(&self, screen: Vec2) -> Option<Vec2> {
        self.camera
            .viewport_to_world_2d(self.transform, screen)
            .ok()
    }
}

/// User zoom of the tree plus the lazily captured pivot lock.
#[derive(Resource, Clone, Debug)]
pub struct TreeZoom {
    zoom: f32,
    /// Screen position the pivot is held at; `None` until the first zoom
    /// after start-up or a resize.
    screen_lock: Option<Vec2>,
    dirty: bool,
}

impl Default for TreeZoom {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            screen_lock: None,
            dirty: false,
        }
    }
}

impl TreeZoom {
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Request a new zoom, clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        if zoom != self.zoom {
            self.zoom = zoom;
            self.dirty = true;
        }
    }

    pub fn screen_lock(&self) -> Option<Vec2> {
        self.screen_lock
    }

    /// Drop the captured lock; the next application recaptures it.
    pub fn release(&mut self) {
        self.screen_lock = None;
    }

    /// `true` when a zoom change has not been applied yet.
    pub fn needs_apply(&self) -> bool {
        self.dirty
    }

    /// Scale `root` about its pivot and keep the pivot on the locked pixel.
    ///
    /// The pivot is the root's local origin, so its world position is the
    /// root translation.  Returns the screen lock in use, or `None` (with
    /// nothing changed) when `view` cannot map the pivot.
    pub fn apply<M: ScreenMapping + ?Sized>(
        &mut self,
        view: &M,
        root: &mut Transform,
    ) -> Option<Vec2> {
        let lock = match self.screen_lock {
            Some(lock) => lock,
            None => view.project(root.translation.truncate())?,
        };
        let target = view.unproject(lock)?;

        self.screen_lock = Some(lock);
        root.scale = Vec3::splat(self.zoom);
        root.translation.x = target.x;
        root.translation.y = target.y;
        self.dirty = false;
        Some(lock)
    }
}

/// Owns the current view and reacts to viewport changes.
#[derive(Resource, Clone, Debug)]
pub struct SceneDriver {
    config: SceneConfig,
    view: OrthoView,
    settings: ViewportSettings,
}

impl SceneDriver {
    pub fn new(config: SceneConfig, settings: ViewportSettings) -> Self {
        let view = OrthoView::new(
            Vec2::from(config.default_viewport),
            config.base_half_height,
            settings.external_scale,
        );
        Self {
            config,
            view,
            settings,
        }
    }

    pub fn view(&self) -> &OrthoView {
        &self.view
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// World height of the tree base under the current settings.
    pub fn root_y(&self) -> f32 {
        self.config.base_tree_y + self.settings.tree_offset_y
    }

    /// `true` if `viewport` or `settings` differ from what the view was
    /// last built with.
    pub fn is_stale(&self, viewport: Vec2, settings: &ViewportSettings) -> bool {
        self.view.viewport != viewport.max(Vec2::ONE) || self.settings != *settings
    }

    /// Rebuild the view for a new viewport and release the zoom lock.
    ///
    /// Returns the root height the tree must be moved to.
    pub fn handle_resize(
        &mut self,
        viewport: Vec2,
        settings: ViewportSettings,
        zoom: &mut TreeZoom,
    ) -> f32 {
        self.settings = settings;
        self.view = OrthoView::new(
            viewport,
            self.config.base_half_height,
            settings.external_scale,
        );
        zoom.release();
        self.root_y()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> OrthoView {
        OrthoView::new(Vec2::new(1600.0, 900.0), 10.0, 1.0)
    }

    #[test]
    fn projection_round_trips() {
        let v = view();
        for p in [Vec2::ZERO, Vec2::new(3.0, -8.5), Vec2::new(-12.0, 7.25)] {
            let back = v.unproject(v.project(p));
            assert!((back - p).length() < 1e-4, "{p} came back as {back}");
        }
    }

    #[test]
    fn projection_is_aspect_corrected() {
        let v = view();
        assert_eq!(v.project(Vec2::ZERO), Vec2::new(800.0, 450.0));
        // Top edge at y = +10, right edge at x = 10 · 16/9.
        assert!((v.project(Vec2::new(0.0, 10.0)).y).abs() < 1e-3);
        assert!((v.project(Vec2::new(10.0 * 16.0 / 9.0, 0.0)).x - 1600.0).abs() < 1e-2);
    }

    #[test]
    fn external_scale_shrinks_view() {
        let zoomed = OrthoView::new(Vec2::new(800.0, 800.0), 10.0, 2.0);
        assert_eq!(zoomed.half_height, 5.0);
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert_eq!(OrthoView::new(Vec2::ONE, 10.0, bad).half_height, 10.0);
        }
    }

    #[test]
    fn zoom_keeps_pivot_on_locked_pixel() {
        let v = view();
        let mut zoom = TreeZoom::default();
        let mut root = Transform::from_xyz(0.0, -8.5, 0.0);
        let start = v.project(root.translation.truncate());

        for z in [1.5, 3.0, 0.5, 4.0] {
            zoom.set_zoom(z);
            assert!(zoom.needs_apply());
            let lock = zoom.apply(&v, &mut root).expect("ortho view always maps");
            assert!(!zoom.needs_apply());
            assert_eq!(lock, start);
            assert_eq!(root.scale, Vec3::splat(z));
            let now = v.project(root.translation.truncate());
            assert!((now - start).length() < 1e-3, "pivot drifted to {now}");
        }
    }

    #[test]
    fn lock_is_captured_lazily_and_released_on_resize() {
        let mut driver = SceneDriver::new(SceneConfig::default(), ViewportSettings::default());
        let mut zoom = TreeZoom::default();
        assert_eq!(zoom.screen_lock(), None);

        let mut root = Transform::from_xyz(0.0, driver.root_y(), 0.0);
        zoom.set_zoom(2.0);
        zoom.apply(driver.view(), &mut root);
        let first = zoom.screen_lock().expect("lock captured on first apply");

        let settings = ViewportSettings {
            external_scale: 1.0,
            tree_offset_y: 1.5,
        };
        assert!(driver.is_stale(Vec2::new(1000.0, 1000.0), &settings));
        let y = driver.handle_resize(Vec2::new(1000.0, 1000.0), settings, &mut zoom);
        assert_eq!(y, -7.0);
        assert_eq!(zoom.screen_lock(), None);
        assert!(!driver.is_stale(Vec2::new(1000.0, 1000.0), &settings));

        root.translation.y = y;
        zoom.set_zoom(3.0);
        zoom.apply(driver.view(), &mut root);
        let second = zoom.screen_lock().expect("lock recaptured");
        assert_ne!(first, second);
        let pivot = driver.view().project(root.translation.truncate());
        assert!((pivot - second).length() < 1e-3);
    }

    /// Mapping with no viewport yet, like a camera before its first render.
    struct Unmapped;

    impl ScreenMapping for Unmapped {
        fn project(&self, _: Vec2) -> Option<Vec2> {
            None
        }

        fn unproject(&self, _: Vec2) -> Option<Vec2> {
            None
        }
    }

    #[test]
    fn lock_follows_a_panned_view() {
        let mut v = view();
        v.center = Vec2::new(4.0, -3.0);
        let mut zoom = TreeZoom::default();
        let mut root = Transform::from_xyz(1.0, -8.5, 0.0);
        let start = v.project(root.translation.truncate());

        zoom.set_zoom(2.5);
        assert_eq!(zoom.apply(&v, &mut root), Some(start));
        let now = v.project(root.translation.truncate());
        assert!((now - start).length() < 1e-3, "pivot drifted to {now}");
        // The same screen pixel means a different world point once panned.
        assert_ne!(start, view().project(Vec2::new(1.0, -8.5)));
    }

    #[test]
    fn unavailable_mapping_leaves_everything_pending() {
        let mut zoom = TreeZoom::default();
        let mut root = Transform::from_xyz(0.0, -8.5, 0.0);
        zoom.set_zoom(2.0);

        assert_eq!(zoom.apply(&Unmapped, &mut root), None);
        assert!(zoom.needs_apply());
        assert_eq!(zoom.screen_lock(), None);
        assert_eq!(root, Transform::from_xyz(0.0, -8.5, 0.0));

        assert!(zoom.apply(&view(), &mut root).is_some());
        assert!(!zoom.needs_apply());
    }

    #[test]
    fn set_zoom_clamps_and_ignores_noops() {
        let mut zoom = TreeZoom::default();
        zoom.set_zoom(1.0);
        assert!(!zoom.needs_apply());
        zoom.set_zoom(100.0);
        assert_eq!(zoom.zoom(), MAX_ZOOM);
        zoom.set_zoom(0.0);
        assert_eq!(zoom.zoom(), MIN_ZOOM);
    }

    #[test]
    fn capability_check_reports_missing_assets() {
        let mut world = World::new();
        assert_eq!(
            check_render_capabilities(&world),
            Err(SceneError::MissingCapability("Assets<Mesh>"))
        );
        world.insert_resource(Assets::<Mesh>::default());
        assert_eq!(
            check_render_capabilities(&world),
            Err(SceneError::MissingCapability("Assets<StandardMaterial>"))
        );
        world.insert_resource(Assets::<StandardMaterial>::default());
        assert!(check_render_capabilities(&world).is_ok());
    }
}
