//! Bevy wiring: spawns the ink tree and drives it every frame.
//!
//! # Entities
//! * `TreeRoot`: pivot at the trunk base; sway rotates it, zoom scales it.
//!   * one [`InkLayer`] per live variant (bleeds behind the primary)
//!   * the crow pool ([`CrowAgent`]), each with its own material so its
//!     opacity can pulse independently
//! * [`HazeLayer`]: static band in world space, never updated
//! * [`InkCamera`]: optional orthographic camera
//!
//! # Per frame
//! `sync_viewport` → `apply_tree_zoom`, then independently `sway_tree`,
//! `deform_ink_layers` and `advance_crows`.  Deformation and crows never
//! read each other's output, so their order does not matter.

use bevy::{camera::ScalingMode, color::Alpha, prelude::*, window::PrimaryWindow};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    InkwoodConfig,
    crow::{Crow, CrowTransition},
    line_mesh::LineMesh,
    scene::{CameraView, SceneDriver, TreeZoom, ViewportSettings},
    topology::Topology,
    wind::{BleedLayer, HazeConfig, InkDeformer, InkFrame, haze_lines},
};

/// Colour and opacity of one drawn layer.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct InkStyle {
    /// Linear RGB in \[0, 1\].
    pub color: [f32; 3],
    pub alpha: f32,
}

impl InkStyle {
    pub fn grey(level: f32, alpha: f32) -> Self {
        Self {
            color: [level; 3],
            alpha,
        }
    }

    fn material(&self) -> StandardMaterial {
        let [r, g, b] = self.color;
        StandardMaterial {
            base_color: Color::linear_rgba(r, g, b, self.alpha),
            unlit: true,
            alpha_mode: AlphaMode::Blend,
            ..default()
        }
    }
}

/// One bleed duplicate: how it moves and how it is drawn.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BleedStyle {
    pub motion: BleedLayer,
    pub style: InkStyle,
}

/// Appearance of every layer the scene draws.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct InkConfig {
    pub primary: InkStyle,
    /// Ordered front to back; each sits one depth step behind the last.
    pub bleeds: Vec<BleedStyle>,
    pub haze: HazeConfig,
    pub haze_style: InkStyle,
    /// Crow colour; opacity is driven by the crow state machine.
    pub crow_color: [f32; 3],
}

impl Default for InkConfig {
    fn default() -> Self {
        Self {
            primary: InkStyle::grey(0.95, 1.0),
            bleeds: vec![
                BleedStyle {
                    motion: BleedLayer::near(),
                    style: InkStyle::grey(0.9, 0.38),
                },
                BleedStyle {
                    motion: BleedLayer::far(),
                    style: InkStyle::grey(0.85, 0.18),
                },
            ],
            haze: HazeConfig::default(),
            haze_style: InkStyle::grey(1.0, 0.14),
            crow_color: [0.95; 3],
        }
    }
}

/// Marks the tree's root transform node.
#[derive(Component)]
pub struct TreeRoot;

/// Which live variant an [`InkLayer`] draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InkVariant {
    Primary,
    /// Index into [`InkConfig::bleeds`].
    Bleed(usize),
}

/// A rewritable line mesh showing one variant of the tree.
#[derive(Component)]
pub struct InkLayer {
    pub variant: InkVariant,
    pub layout: LineMesh,
}

/// Marks the static haze band.
#[derive(Component)]
pub struct HazeLayer;

/// Marks the camera the tree is viewed through.
///
/// The plugin tags the camera it spawns; with `spawn_camera` off, tag the
/// host camera so the zoom lock uses its projection.
#[derive(Component)]
pub struct InkCamera;

/// A crow entity's state machine.
#[derive(Component)]
pub struct CrowAgent(pub Crow);

/// Generated tree and per-frame scratch buffers.
#[derive(Resource)]
pub struct InkTree {
    topology: Topology,
    deformer: InkDeformer,
    frame: InkFrame,
    bleed_motion: Vec<BleedLayer>,
    perches: Vec<Vec2>,
}

impl InkTree {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn perches(&self) -> &[Vec2] {
        &self.perches
    }

    /// Buffers written by the last `deform_ink_layers` run.
    pub fn frame(&self) -> &InkFrame {
        &self.frame
    }
}

/// RNG shared by all crows; seeded from [`crate::crow::CrowConfig::seed`].
#[derive(Resource)]
pub struct CrowRng(pub StdRng);

fn crow_transform(crow: &Crow, z: f32) -> Transform {
    Transform {
        translation: crow.position.extend(z),
        rotation: Quat::from_rotation_z(crow.rotation),
        scale: Vec3::splat(crow.scale),
    }
}

/// Startup system: grows the tree and spawns every entity of the scene.
pub fn spawn_ink_tree(
    mut commands: Commands,
    config: Res<InkwoodConfig>,
    driver: Res<SceneDriver>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) -> Result {
    let topology = Topology::generate(&config.tree, Vec2::ZERO)?;
    let step = config.scene.layer_depth_step;
    let root_y = driver.root_y();

    let root = commands
        .spawn((
            Name::new("ink_tree"),
            TreeRoot,
            Transform::from_xyz(0.0, root_y, 0.0),
            Visibility::default(),
        ))
        .id();

    let lines = topology.lines();
    let mut spawn_layer = |variant: InkVariant, style: &InkStyle, z: f32| {
        let (layout, mesh) = LineMesh::build(&lines);
        commands.spawn((
            Name::new(format!("ink_{variant:?}").to_lowercase()),
            InkLayer { variant, layout },
            Mesh3d(meshes.add(mesh)),
            MeshMaterial3d(materials.add(style.material())),
            Transform::from_xyz(0.0, 0.0, z),
            ChildOf(root),
        ));
    };
    spawn_layer(InkVariant::Primary, &config.ink.primary, 0.0);
    for (i, bleed) in config.ink.bleeds.iter().enumerate() {
        spawn_layer(InkVariant::Bleed(i), &bleed.style, -step * (i + 1) as f32);
    }

    let haze = haze_lines(&topology, root_y, &config.ink.haze);
    let (_, haze_mesh) = LineMesh::build(&haze);
    commands.spawn((
        Name::new("ink_haze"),
        HazeLayer,
        Mesh3d(meshes.add(haze_mesh)),
        MeshMaterial3d(materials.add(config.ink.haze_style.material())),
        Transform::from_xyz(0.0, 0.0, -step * (config.ink.bleeds.len() + 1) as f32),
    ));

    let crows = &config.crows;
    let mut rng = StdRng::seed_from_u64(crows.seed);
    let perches = topology.perch_points(crows.perch_fraction, crows.min_perch_height);
    if perches.is_empty() && crows.count > 0 {
        warn!(
            "ink tree has no perch points above {}; no crows spawned",
            crows.min_perch_height
        );
    } else if crows.count > 0 {
        let (_, wing) = LineMesh::build(&crows.wing_lines());
        let wing = meshes.add(wing);
        let [r, g, b] = config.ink.crow_color;
        for i in 0..crows.count {
            let perch = perches[rng.random_range(0..perches.len())];
            let crow = Crow::spawn(perch, crows, &mut rng);
            let material = materials.add(StandardMaterial {
                base_color: Color::linear_rgba(r, g, b, crow.alpha),
                unlit: true,
                alpha_mode: AlphaMode::Blend,
                ..default()
            });
            commands.spawn((
                Name::new(format!("crow_{i}")),
                crow_transform(&crow, step),
                CrowAgent(crow),
                Mesh3d(wing.clone()),
                MeshMaterial3d(material),
                ChildOf(root),
            ));
        }
    }

    if config.scene.spawn_camera {
        commands.insert_resource(ClearColor(Color::NONE));
        commands.spawn((
            Name::new("ink_camera"),
            InkCamera,
            Camera3d::default(),
            Projection::from(OrthographicProjection {
                scaling_mode: ScalingMode::FixedVertical {
                    viewport_height: driver.view().half_height * 2.0,
                },
                ..OrthographicProjection::default_3d()
            }),
            Transform::from_xyz(0.0, 0.0, config.scene.camera_distance)
                .looking_at(Vec3::ZERO, Vec3::Y),
        ));
    }

    info!(
        "grew ink tree: {} branches, {} points, {} perches, {} crows",
        topology.branch_count(),
        topology.point_count(),
        perches.len(),
        if perches.is_empty() { 0 } else { crows.count },
    );

    let bleed_motion = config.ink.bleeds.iter().map(|b| b.motion.clone()).collect();
    commands.insert_resource(InkTree {
        deformer: InkDeformer::new(&topology, config.wind.clone()),
        frame: InkFrame::new(&topology, config.ink.bleeds.len()),
        topology,
        bleed_motion,
        perches,
    });
    commands.insert_resource(CrowRng(rng));
    Ok(())
}

/// Bevy system: treats window size or [`ViewportSettings`] changes as a resize.
pub fn sync_viewport(
    windows: Query<&Window, With<PrimaryWindow>>,
    settings: Res<ViewportSettings>,
    mut driver: ResMut<SceneDriver>,
    mut zoom: ResMut<TreeZoom>,
    mut roots: Query<&mut Transform, With<TreeRoot>>,
    mut cameras: Query<&mut Projection, With<InkCamera>>,
) {
    let viewport = match windows.single() {
        Ok(window) => Vec2::new(window.width(), window.height()),
        Err(_) => driver.view().viewport,
    };
    if !driver.is_stale(viewport, &settings) {
        return;
    }

    let root_y = driver.handle_resize(viewport, *settings, &mut zoom);
    debug!(
        "viewport {}x{} scale {}: tree base moved to y={root_y}, zoom lock released",
        viewport.x, viewport.y, settings.external_scale
    );

    for mut root in &mut roots {
        root.translation.y = root_y;
    }
    let viewport_height = driver.view().half_height * 2.0;
    for mut projection in &mut cameras {
        if let Projection::Orthographic(ortho) = projection.as_mut() {
            ortho.scaling_mode = ScalingMode::FixedVertical { viewport_height };
        }
    }
}

/// Bevy system: applies a pending zoom while keeping the base pinned on screen.
///
/// Goes through the [`InkCamera`]'s own projection when it can map the
/// pivot, otherwise through the driver's [`OrthoView`](crate::scene::OrthoView).
pub fn apply_tree_zoom(
    driver: Res<SceneDriver>,
    mut zoom: ResMut<TreeZoom>,
    cameras: Query<(&Camera, &GlobalTransform), With<InkCamera>>,
    mut roots: Query<&mut Transform, With<TreeRoot>>,
) {
    if !zoom.needs_apply() {
        return;
    }
    let camera = cameras
        .single()
        .ok()
        .map(|(camera, transform)| CameraView { camera, transform });
    for mut root in &mut roots {
        let fresh = zoom.screen_lock().is_none();
        let applied = camera
            .as_ref()
            .and_then(|view| zoom.apply(view, &mut root))
            .or_else(|| zoom.apply(driver.view(), &mut root));
        if let Some(lock) = applied
            && fresh
        {
            debug!("tree base locked at screen {lock}");
        }
    }
}

/// Bevy system: slow whole-tree sway about the base.
pub fn sway_tree(
    time: Res<Time>,
    config: Res<InkwoodConfig>,
    mut roots: Query<&mut Transform, With<TreeRoot>>,
) {
    let angle = config.wind.sway(time.elapsed_secs());
    for mut root in &mut roots {
        root.rotation = Quat::from_rotation_z(angle);
    }
}

/// Bevy system: recomputes every live ink layer and rewrites its mesh.
pub fn deform_ink_layers(
    time: Res<Time>,
    tree: ResMut<InkTree>,
    layers: Query<(&InkLayer, &Mesh3d)>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let InkTree {
        topology,
        deformer,
        frame,
        bleed_motion,
        ..
    } = tree.into_inner();
    frame.render(deformer, topology, bleed_motion, time.elapsed_secs());

    for (layer, mesh3d) in &layers {
        let lines = match layer.variant {
            InkVariant::Primary => &frame.primary,
            InkVariant::Bleed(i) => match frame.bleeds.get(i) {
                Some(lines) => lines,
                None => continue,
            },
        };
        let Some(mut mesh) = meshes.get_mut(&mesh3d.0) else {
            continue;
        };
        layer.layout.write(&mut mesh, lines);
    }
}

/// Bevy system: steps every crow and mirrors it into its transform and material.
pub fn advance_crows(
    time: Res<Time>,
    config: Res<InkwoodConfig>,
    tree: Res<InkTree>,
    mut rng: ResMut<CrowRng>,
    mut crows: Query<(
        Entity,
        &mut CrowAgent,
        &mut Transform,
        &MeshMaterial3d<StandardMaterial>,
    )>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let dt = time.delta_secs();
    let elapsed = time.elapsed_secs();
    for (entity, mut agent, mut transform, material) in &mut crows {
        let crow = &mut agent.0;
        let alpha = crow.alpha;
        match crow.advance(dt, elapsed, &tree.perches, &config.crows, &mut rng.0) {
            Some(CrowTransition::TookOff) => trace!("crow {entity} took off"),
            Some(CrowTransition::Landed) => trace!("crow {entity} landed at {}", crow.position),
            None => {}
        }

        transform.translation.x = crow.position.x;
        transform.translation.y = crow.position.y;
        transform.rotation = Quat::from_rotation_z(crow.rotation);

        if crow.alpha != alpha
            && let Some(mut mat) = materials.get_mut(&material.0)
        {
            mat.base_color.set_alpha(crow.alpha);
        }
    }
}

/// Despawn the whole scene and drop its resources.
///
/// Per-frame systems stop once [`InkTree`] is gone.
pub fn despawn_ink_tree(
    mut commands: Commands,
    roots: Query<Entity, With<TreeRoot>>,
    haze: Query<Entity, With<HazeLayer>>,
    cameras: Query<Entity, With<InkCamera>>,
) {
    for entity in roots.iter().chain(haze.iter()).chain(cameras.iter()) {
        commands.entity(entity).despawn();
    }
    commands.remove_resource::<InkTree>();
    commands.remove_resource::<CrowRng>();
    info!("ink tree torn down");
}
