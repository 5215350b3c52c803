//! Sample plugin: a scrolling gradient with timed phases.
//!
//! Build it, start `hotframe-host`, then edit and rebuild this crate while
//! the host runs. Copy the fresh artifact to `<artifact>.toggle` (or let a
//! build script alternate) and the host picks it up on the next frame,
//! keeping the state stored in host memory.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use hotframe_core::{
    ArenaHandle, DebugHooks, Input, IoFunctions, Memory, MemoryArena, PluginBlock, Surface,
};

/// Number of frame times kept in the arena.
const HISTORY_LEN: usize = 64;

/// File read once at startup to pick the gradient tone.
const TONE_FILE: &str = "demo_tone.txt";

/// Persistent plugin state, stored at the front of host memory.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct GameState {
    initialized: u32,
    frame: u32,
    time: f32,
    tone: u32,
    offset_x: i32,
    offset_y: i32,
    /// Ring of recent `update_dt` values in the arena.
    history: ArenaHandle,
    /// Address of the entry point that registered `sites`; a reload changes it.
    sites_owner: u64,
    /// Call-site ids plus one, 0 when registration failed.
    sites: [u32; 4],
}

const SITE_FRAME: usize = 0;
const SITE_INITIALIZE: usize = 1;
const SITE_SIMULATE: usize = 2;
const SITE_RENDER: usize = 3;

/// Plugin entry point called by the host once per frame.
///
/// # Safety
/// All pointers must be valid for the duration of the call, as provided by
/// the host.
#[no_mangle]
pub unsafe extern "C" fn update_and_render(
    surface: *mut Surface,
    input: *const Input,
    memory: *mut Memory,
    io: *const IoFunctions,
) {
    if surface.is_null() || input.is_null() || memory.is_null() || io.is_null() {
        return;
    }
    // SAFETY: Non-null pointers from the host are valid for this call
    let (surface, input, memory, io) = unsafe { (&mut *surface, &*input, &mut *memory, &*io) };
    let hooks = &io.debug;

    // SAFETY: The host's block backs memory for the duration of the call
    let (state_bytes, mut arena) = unsafe { memory.split() };
    let Some(state) = state_bytes
        .get_mut(..size_of::<GameState>())
        .and_then(|bytes| bytemuck::try_from_bytes_mut::<GameState>(bytes).ok())
    else {
        return;
    };

    register_sites(state, hooks);
    let _frame = begin(hooks, state.sites[SITE_FRAME]);

    if state.initialized == 0 {
        initialize(state, &mut arena, io);
    }

    simulate(state, input, &mut arena, hooks);
    let width = surface.width;
    // SAFETY: The host's pixel buffer backs the surface
    render(state, unsafe { surface.pixels_mut() }, width, hooks);
}

/// Register the timed phases once per loaded library.
fn register_sites(state: &mut GameState, hooks: &DebugHooks) {
    let owner = update_and_render as usize as u64;
    if state.sites_owner == owner {
        return;
    }

    let slot = |id: Option<u16>| id.map_or(0, |id| u32::from(id) + 1);
    state.sites = [
        slot(hooks.register(file!(), "update_and_render", line!())),
        slot(hooks.register(file!(), "initialize", line!())),
        slot(hooks.register(file!(), "simulate", line!())),
        slot(hooks.register(file!(), "render", line!())),
    ];
    state.sites_owner = owner;
}

fn begin(hooks: &DebugHooks, slot: u32) -> Option<PluginBlock<'_>> {
    let id = u16::try_from(slot.checked_sub(1)?).ok()?;
    Some(hooks.begin(id))
}

fn initialize(state: &mut GameState, arena: &mut MemoryArena<'_>, io: &IoFunctions) {
    let _block = begin(&io.debug, state.sites[SITE_INITIALIZE]);

    state.tone = io
        .read_entire_file(TONE_FILE)
        .and_then(|file| {
            std::str::from_utf8(file.as_bytes())
                .ok()
                .and_then(|text| text.trim().parse::<u32>().ok())
        })
        .unwrap_or(0x40);

    if let Ok(history) = arena.push_array::<f32>(HISTORY_LEN) {
        state.history = history;
    }
    state.initialized = 1;
}

fn simulate(
    state: &mut GameState,
    input: &Input,
    arena: &mut MemoryArena<'_>,
    hooks: &DebugHooks,
) {
    let _block = begin(hooks, state.sites[SITE_SIMULATE]);

    state.frame = state.frame.wrapping_add(1);
    state.time += input.update_dt;
    state.offset_x = state.offset_x.wrapping_add(1);
    state.offset_y = state.offset_y.wrapping_add(2);

    if input.mouse_left.just_pressed() {
        state.tone = state.tone.wrapping_add(0x20) & 0xff;
        state.offset_x = input.mouse_x;
        state.offset_y = input.mouse_y;
    }

    if let Ok(history) = arena.get_slice_mut::<f32>(state.history) {
        let slot = state.frame as usize % history.len().max(1);
        if let Some(entry) = history.get_mut(slot) {
            *entry = input.update_dt;
        }
    }
}

fn render(state: &GameState, pixels: &mut [u32], width: u32, hooks: &DebugHooks) {
    let Some(mut block) = begin(hooks, state.sites[SITE_RENDER]) else {
        draw_gradient(state, pixels, width);
        return;
    };
    let rows = draw_gradient(state, pixels, width);
    block.set_hits(rows);
}

/// Fill `pixels` with a gradient; returns the number of rows drawn.
fn draw_gradient(state: &GameState, pixels: &mut [u32], width: u32) -> u32 {
    if width == 0 {
        return 0;
    }

    let mut rows = 0;
    for (y, row) in pixels.chunks_mut(width as usize).enumerate() {
        let green = (y as i32).wrapping_add(state.offset_y) as u32 & 0xff;
        for (x, pixel) in row.iter_mut().enumerate() {
            let blue = (x as i32).wrapping_add(state.offset_x) as u32 & 0xff;
            *pixel = (state.tone << 16) | (green << 8) | blue;
        }
        rows += 1;
    }
    rows
}
