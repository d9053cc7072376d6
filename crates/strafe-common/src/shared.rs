// shared.rs — protocol types, limits, and math shared by every crate

use bitflags::bitflags;

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// angle indexes
pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

// ============================================================
// String limits
// ============================================================

/// Max length of a single statement after buffer-level splitting.
pub const MAX_STRING_CHARS: usize = 1024;
/// Max tokens per tokenized statement.
pub const MAX_STRING_TOKENS: usize = 80;
/// Max length of an alias name.
pub const MAX_ALIAS_NAME: usize = 32;

// ============================================================
// Vector math
// ============================================================

pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross_product(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

pub fn vector_scale(v: &Vec3, s: f32) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

pub fn vector_clear(v: &mut Vec3) {
    *v = VEC3_ORIGIN;
}

/// Normalize in place, returning the original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

// ============================================================
// Network angle encoding
// ============================================================

pub fn angle2short(x: f32) -> i16 {
    ((x * 65536.0 / 360.0) as i32 & 65535) as i16
}

pub fn short2angle(x: i16) -> f32 {
    x as f32 * (360.0 / 65536.0)
}

/// Build forward/right/up basis vectors from euler angles (degrees).
pub fn angle_vectors(
    angles: &Vec3,
    forward: Option<&mut Vec3>,
    right: Option<&mut Vec3>,
    up: Option<&mut Vec3>,
) {
    let angle = angles[YAW] * (std::f32::consts::PI * 2.0 / 360.0);
    let sy = angle.sin();
    let cy = angle.cos();
    let angle = angles[PITCH] * (std::f32::consts::PI * 2.0 / 360.0);
    let sp = angle.sin();
    let cp = angle.cos();
    let angle = angles[ROLL] * (std::f32::consts::PI * 2.0 / 360.0);
    let sr = angle.sin();
    let cr = angle.cos();

    if let Some(f) = forward {
        f[0] = cp * cy;
        f[1] = cp * sy;
        f[2] = -sp;
    }
    if let Some(r) = right {
        r[0] = -sr * sp * cy + cr * sy;
        r[1] = -sr * sp * sy - cr * cy;
        r[2] = -sr * cp;
    }
    if let Some(u) = up {
        u[0] = cr * sp * cy + sr * sy;
        u[1] = cr * sp * sy - sr * cy;
        u[2] = cr * cp;
    }
}

// ============================================================
// Content flags and masks
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WINDOW: i32 = 2;
pub const CONTENTS_AUX: i32 = 4;
pub const CONTENTS_LAVA: i32 = 8;
pub const CONTENTS_SLIME: i32 = 16;
pub const CONTENTS_WATER: i32 = 32;
pub const CONTENTS_MIST: i32 = 64;

pub const CONTENTS_PLAYERCLIP: i32 = 0x10000;
pub const CONTENTS_MONSTERCLIP: i32 = 0x20000;

pub const CONTENTS_CURRENT_0: i32 = 0x40000;
pub const CONTENTS_CURRENT_90: i32 = 0x80000;
pub const CONTENTS_CURRENT_180: i32 = 0x100000;
pub const CONTENTS_CURRENT_270: i32 = 0x200000;
pub const CONTENTS_CURRENT_UP: i32 = 0x400000;
pub const CONTENTS_CURRENT_DOWN: i32 = 0x800000;

pub const CONTENTS_MONSTER: i32 = 0x2000000;
pub const CONTENTS_DEADMONSTER: i32 = 0x4000000;

pub const MASK_SOLID: i32 = CONTENTS_SOLID | CONTENTS_WINDOW;
pub const MASK_PLAYERSOLID: i32 =
    CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;
pub const MASK_DEADSOLID: i32 = CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW;
pub const MASK_WATER: i32 = CONTENTS_WATER | CONTENTS_LAVA | CONTENTS_SLIME;
pub const MASK_CURRENT: i32 = CONTENTS_CURRENT_0
    | CONTENTS_CURRENT_90
    | CONTENTS_CURRENT_180
    | CONTENTS_CURRENT_270
    | CONTENTS_CURRENT_UP
    | CONTENTS_CURRENT_DOWN;

// surface flags (only the one movement cares about)
pub const SURF_SLICK: i32 = 0x2;

// ============================================================
// Collision plane / surface / trace
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    pub signbits: u8,
}

#[derive(Debug, Clone, Default)]
pub struct CSurface {
    pub name: String,
    pub flags: i32,
    pub value: i32,
}

/// Result of a segment trace through world and solids.
#[derive(Debug, Clone)]
pub struct Trace {
    pub allsolid: bool,
    pub startsolid: bool,
    pub fraction: f32,
    pub endpos: Vec3,
    pub plane: CPlane,
    pub surface: Option<CSurface>,
    pub contents: i32,
    /// Blocking entity number, -1 for none.
    pub ent: i32,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: VEC3_ORIGIN,
            plane: CPlane::default(),
            surface: None,
            contents: 0,
            ent: -1,
        }
    }
}

// ============================================================
// Player movement wire state
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum PmType {
    #[default]
    Normal = 0,
    Spectator = 1,
    Dead = 2,
    Gib = 3,
    Freeze = 4,
}

bitflags! {
    /// Movement state flags, carried bit-accurate between server and client.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PmFlags: u8 {
        const DUCKED         = 1;
        const JUMP_HELD      = 2;
        const ON_GROUND      = 4;
        const TIME_WATERJUMP = 8;
        const TIME_LAND      = 16;
        const TIME_TELEPORT  = 32;
        const NO_PREDICTION  = 64;
    }
}

/// Communicated bit-accurate between server and client for prediction
/// sync. No floats — origin and velocity are 12.3 fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PmoveState {
    pub pm_type: PmType,
    pub origin: [i16; 3],
    pub velocity: [i16; 3],
    pub pm_flags: PmFlags,
    pub pm_time: u8,
    pub gravity: i16,
    pub delta_angles: [i16; 3],
}

// ============================================================
// User command
// ============================================================

pub const BUTTON_ATTACK: u8 = 1;
pub const BUTTON_USE: u8 = 2;
pub const BUTTON_ANY: u8 = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct UserCmd {
    pub msec: u8,
    pub buttons: u8,
    pub angles: [i16; 3],
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
    pub impulse: u8,
    pub lightlevel: u8,
}

// ============================================================
// Pmove in/out block
// ============================================================

pub const MAXTOUCH: usize = 32;
pub const MAX_CLIP_PLANES: usize = 5;

/// Everything one movement step consumes and produces. The world-query
/// capability is passed separately; this is pure data.
#[derive(Debug, Clone)]
pub struct PmoveData {
    pub s: PmoveState,

    // in
    pub cmd: UserCmd,
    pub snapinitial: bool,
    pub clip_mask: i32,

    // out
    pub numtouch: usize,
    pub touchents: [i32; MAXTOUCH],
    pub viewangles: Vec3,
    pub viewheight: f32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub groundentity: i32,
    pub watertype: i32,
    pub waterlevel: i32,
}

impl Default for PmoveData {
    fn default() -> Self {
        Self {
            s: PmoveState::default(),
            cmd: UserCmd::default(),
            snapinitial: false,
            clip_mask: MASK_PLAYERSOLID,
            numtouch: 0,
            touchents: [-1; MAXTOUCH],
            viewangles: VEC3_ORIGIN,
            viewheight: 0.0,
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
            groundentity: -1,
            watertype: 0,
            waterlevel: 0,
        }
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_roundtrip() {
        for deg in [0.0f32, 45.0, 90.0, 180.0, 270.0] {
            let s = angle2short(deg);
            let back = short2angle(s);
            assert!((back - deg).abs() < 0.01, "{} -> {} -> {}", deg, s, back);
        }
    }

    #[test]
    fn test_short2angle_quarter_turn() {
        assert!((short2angle(16384) - 90.0).abs() < 0.001);
        assert!((short2angle(-16384) + 90.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_returns_length() {
        let mut v = [3.0, 4.0, 0.0];
        let len = vector_normalize(&mut v);
        assert!((len - 5.0).abs() < 0.0001);
        assert!((vector_length(&v) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = VEC3_ORIGIN;
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, VEC3_ORIGIN);
    }

    #[test]
    fn test_angle_vectors_straight_ahead() {
        let mut forward = VEC3_ORIGIN;
        angle_vectors(&[0.0, 0.0, 0.0], Some(&mut forward), None, None);
        assert!((forward[0] - 1.0).abs() < 0.0001);
        assert!(forward[1].abs() < 0.0001);
        assert!(forward[2].abs() < 0.0001);
    }

    #[test]
    fn test_angle_vectors_yaw_90() {
        let mut forward = VEC3_ORIGIN;
        let mut right = VEC3_ORIGIN;
        angle_vectors(&[0.0, 90.0, 0.0], Some(&mut forward), Some(&mut right), None);
        assert!(forward[0].abs() < 0.0001);
        assert!((forward[1] - 1.0).abs() < 0.0001);
        // right stays perpendicular
        assert!(dot_product(&forward, &right).abs() < 0.0001);
    }

    #[test]
    fn test_cross_product_basis() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        assert_eq!(cross_product(&x, &y), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_pm_flags_are_wire_compatible() {
        let f = PmFlags::ON_GROUND | PmFlags::DUCKED;
        assert_eq!(f.bits(), 5);
        assert_eq!(PmFlags::from_bits_truncate(5), f);
    }
}
