// client.rs — client-side state consumed by prediction

use strafe_common::shared::{PmoveState, UserCmd, Vec3, VEC3_ORIGIN};

/// Input command ring size; allow a lot of command backup for very fast
/// systems.
pub const CMD_BACKUP: usize = 64;
pub const CMD_MASK: usize = CMD_BACKUP - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Active,
}

/// Sequence bookkeeping for one sent packet frame, so an incoming ack
/// can be mapped back to the input command it covers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmdHistory {
    pub cmd_number: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NetChan {
    pub incoming_acknowledged: u32,
    pub outgoing_sequence: u32,
}

/// Authoritative player state subset carried by a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerState {
    pub pmove: PmoveState,
    pub viewangles: Vec3,
}

/// One authoritative server snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frame {
    pub valid: bool,
    pub number: i32,
    pub ps: PlayerState,
}

/// A snapshot entity the client must clip movement against.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolidEntity {
    pub number: i32,
    /// 31 marks an inline BSP submodel; anything else is a 5-5-6
    /// encoded bounding box.
    pub solid: i32,
    pub modelindex: usize,
    pub origin: Vec3,
    pub angles: Vec3,
}

/// Per-connection client state.
pub struct ClientState {
    pub viewangles: Vec3,

    /// Pending command still being composed this frame.
    pub cmd: UserCmd,
    /// Live move amounts for the pending command.
    pub localmove: [i16; 3],
    /// Issued commands, kept until acknowledged.
    pub cmds: [UserCmd; CMD_BACKUP],
    /// Sequence number of the newest finalized command.
    pub cmd_number: u32,

    pub history: [CmdHistory; CMD_BACKUP],

    pub frame: Frame,

    // prediction output for the renderer
    pub predicted_origin: Vec3,
    pub predicted_velocity: Vec3,
    pub predicted_angles: Vec3,
    /// Decaying visual-only correction; never fed back into simulation.
    pub prediction_error: Vec3,

    /// Origin predicted after simulating each command, by sequence
    /// number modulo CMD_BACKUP. Slots older than that are invalid.
    pub predicted_origins: [[i16; 3]; CMD_BACKUP],

    // stair step smoothing
    pub predicted_step: f32,
    pub predicted_step_time: u32,
    /// Frames at or before this never trigger step smoothing again.
    pub predicted_step_frame: u32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            viewangles: VEC3_ORIGIN,
            cmd: UserCmd::default(),
            localmove: [0; 3],
            cmds: [UserCmd::default(); CMD_BACKUP],
            cmd_number: 0,
            history: [CmdHistory::default(); CMD_BACKUP],
            frame: Frame::default(),
            predicted_origin: VEC3_ORIGIN,
            predicted_velocity: VEC3_ORIGIN,
            predicted_angles: VEC3_ORIGIN,
            prediction_error: VEC3_ORIGIN,
            predicted_origins: [[0; 3]; CMD_BACKUP],
            predicted_step: 0.0,
            predicted_step_time: 0,
            predicted_step_frame: 0,
        }
    }
}

/// Connection-lifetime state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientStatic {
    pub state: ConnState,
    /// Wall clock in milliseconds.
    pub realtime: u32,
    pub frametime: f32,
    /// Playing back a recording; never predict over canned input.
    pub demo_playback: bool,
    pub netchan: NetChan,
}
