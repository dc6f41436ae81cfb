//! `ink_tree` — the animated ink tree on a transparent window.
//!
//! Run with:
//!   cargo run --example ink_tree
//!
//! Mouse wheel zooms the tree about its base; Up/Down change the external
//! display scale; PageUp/PageDown move the tree vertically; Space reseeds.

use bevy::input::mouse::AccumulatedMouseScroll;
use bevy::prelude::*;
use bevy_inkwood::{
    InkwoodConfig, InkwoodPlugin, TreeZoom, ViewportSettings, despawn_ink_tree,
    render::spawn_ink_tree,
};

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "bevy_inkwood — ink tree".into(),
                resolution: (1280, 720).into(),
                transparent: true,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(InkwoodPlugin::default())
        .add_systems(Update, (wheel_zoom, display_controls, reseed))
        .run();
}

fn wheel_zoom(scroll: Res<AccumulatedMouseScroll>, mut zoom: ResMut<TreeZoom>) {
    if scroll.delta.y == 0.0 {
        return;
    }
    let next = zoom.zoom() * (1.0 + scroll.delta.y * 0.1);
    zoom.set_zoom(next);
}

fn display_controls(keyboard: Res<ButtonInput<KeyCode>>, mut settings: ResMut<ViewportSettings>) {
    if keyboard.just_pressed(KeyCode::ArrowUp) {
        settings.external_scale = (settings.external_scale + 0.25).min(3.0);
    }
    if keyboard.just_pressed(KeyCode::ArrowDown) {
        settings.external_scale = (settings.external_scale - 0.25).max(0.5);
    }
    if keyboard.just_pressed(KeyCode::PageUp) {
        settings.tree_offset_y += 0.5;
    }
    if keyboard.just_pressed(KeyCode::PageDown) {
        settings.tree_offset_y -= 0.5;
    }
}

/// Tear the scene down and grow a new tree from a fresh seed.
fn reseed(world: &mut World) {
    let pressed = world
        .resource::<ButtonInput<KeyCode>>()
        .just_pressed(KeyCode::Space);
    if !pressed {
        return;
    }
    {
        let mut config = world.resource_mut::<InkwoodConfig>();
        config.tree.seed += 1.0;
        config.crows.seed = config.crows.seed.wrapping_add(1);
    }
    if let Err(e) = world.run_system_cached(despawn_ink_tree) {
        error!("teardown failed: {e}");
        return;
    }
    match world.run_system_cached(spawn_ink_tree) {
        Ok(Ok(())) => *world.resource_mut::<TreeZoom>() = TreeZoom::default(),
        Ok(Err(e)) => error!("regrowth failed: {e}"),
        Err(e) => error!("regrowth could not run: {e}"),
    }
}
