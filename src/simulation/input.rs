//! Pointer input for interacting with the fluid.
//!
//! Left button attracts particles towards the cursor, right button pushes them away.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

/// Pointer state in world coordinates, read by the force kernel once per frame.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq)]
pub struct InteractionInput {
    pub position: Vec2,
    pub attract: bool,
    pub repel: bool,
}

impl InteractionInput {
    pub fn is_active(&self) -> bool {
        self.attract || self.repel
    }
}

/// System mapping the mouse to [`InteractionInput`].
pub fn handle_pointer_input(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut input: ResMut<InteractionInput>,
) {
    input.attract = buttons.pressed(MouseButton::Left);
    input.repel = buttons.pressed(MouseButton::Right);

    let Ok(window) = windows.get_single() else {
        return;
    };
    let Ok((camera, transform)) = cameras.get_single() else {
        return;
    };
    if let Some(world) = window
        .cursor_position()
        .and_then(|cursor| camera.viewport_to_world_2d(transform, cursor).ok())
    {
        input.position = world;
    }
}
