//! `bevy_inkwood` — an animated ink-drawn tree for Bevy.
//!
//! # Architecture
//! A seeded, recursive branch generator ([`BranchGenerator`]) grows a 2-D
//! tree once.  [`Topology`] freezes it and assigns every point a height
//! weight.  Each frame the wind model ([`InkDeformer`]) recomputes the
//! primary ink layer from scratch as a pure function of time, and derives
//! the bleed duplicates from it.  [`LineMesh`] writes those buffers into
//! meshes whose shape never changes.  A pool of crows perches on the
//! branches and flies between perch points.
//!
//! Add [`InkwoodPlugin`] to an app that already has the asset and PBR
//! plugins (e.g. `DefaultPlugins`).

pub mod crow;
pub mod hash;
pub mod line_mesh;
pub mod render;
pub mod scene;
pub mod topology;
pub mod tree;
pub mod wind;

pub use crow::{Crow, CrowConfig, CrowError};
pub use line_mesh::{LineMesh, LineMeshError};
pub use render::{InkConfig, InkLayer, InkTree, TreeRoot, despawn_ink_tree};
pub use scene::{SceneConfig, SceneDriver, SceneError, TreeZoom, ViewportSettings};
pub use topology::Topology;
pub use tree::{Branch, BranchGenerator, TreeConfig, TreeError};
pub use wind::{BleedLayer, InkDeformer, InkFrame, WindConfig, WindError};

use bevy::prelude::*;

/// Every tunable of the scene in one serialisable bundle.
#[derive(Resource, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct InkwoodConfig {
    pub tree: TreeConfig,
    pub wind: WindConfig,
    pub ink: InkConfig,
    pub crows: CrowConfig,
    pub scene: SceneConfig,
}

impl InkwoodConfig {
    /// Check every section; the first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tree.validate()?;
        self.wind.validate()?;
        self.crows.validate()?;
        Ok(())
    }
}

/// An [`InkwoodConfig`] section failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Tree(TreeError),
    Wind(WindError),
    Crows(CrowError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Tree(e) => write!(f, "tree config: {e}"),
            ConfigError::Wind(e) => write!(f, "wind config: {e}"),
            ConfigError::Crows(e) => write!(f, "crow config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Tree(e) => Some(e),
            ConfigError::Wind(e) => Some(e),
            ConfigError::Crows(e) => Some(e),
        }
    }
}

impl From<TreeError> for ConfigError {
    fn from(e: TreeError) -> Self {
        ConfigError::Tree(e)
    }
}

impl From<WindError> for ConfigError {
    fn from(e: WindError) -> Self {
        ConfigError::Wind(e)
    }
}

impl From<CrowError> for ConfigError {
    fn from(e: CrowError) -> Self {
        ConfigError::Crows(e)
    }
}

/// Bevy plugin: grows the tree at startup and animates it every frame.
///
/// # Panics
/// `build` panics on an invalid [`InkwoodConfig`]; `finish` panics when the
/// app cannot store meshes or materials.
#[derive(Default)]
pub struct InkwoodPlugin {
    pub config: InkwoodConfig,
}

impl Plugin for InkwoodPlugin {
    fn build(&self, app: &mut App) {
        if let Err(e) = self.config.validate() {
            panic!("InkwoodPlugin: {e}");
        }

        app.insert_resource(self.config.clone())
            .init_resource::<ViewportSettings>()
            .init_resource::<TreeZoom>();
        let settings = *app.world().resource::<ViewportSettings>();
        app.insert_resource(SceneDriver::new(self.config.scene.clone(), settings))
            .add_systems(Startup, render::spawn_ink_tree)
            .add_systems(
                Update,
                (
                    (render::sync_viewport, render::apply_tree_zoom).chain(),
                    render::sway_tree,
                    render::deform_ink_layers,
                    render::advance_crows,
                )
                    .run_if(resource_exists::<InkTree>),
            );
    }

    fn finish(&self, app: &mut App) {
        if let Err(e) = scene::check_render_capabilities(app.world()) {
            panic!("InkwoodPlugin: {e}");
        }
    }
}
