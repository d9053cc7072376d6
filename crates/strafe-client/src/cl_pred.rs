// cl_pred.rs — client-side movement prediction and reconciliation

use crate::client::{ClientState, ClientStatic, ConnState, SolidEntity, CMD_BACKUP, CMD_MASK};
use strafe_common::common::com_dprintf;
use strafe_common::pmove::{pmove, MoveParams, WorldQuery};
use strafe_common::shared::{
    short2angle, PmFlags, PmType, PmoveData, Trace, Vec3, MASK_DEADSOLID, MASK_PLAYERSOLID,
    VEC3_ORIGIN,
};

// reconciliation thresholds, in fixed-point units
const PREDICTION_NOISE: i32 = 1;
/// More than 80 world units is a teleport or respawn, not a miss.
const PREDICTION_TELEPORT: i32 = 640;

// stair step window, fixed-point vertical displacement
const STEP_MIN: i32 = 63;
const STEP_MAX: i32 = 160;
const STEP_DECAY_MS: u32 = 100;
const STEP_LIMIT: f32 = 32.0;

// ============================================================
// Orientation prediction
// ============================================================

/// Orientation is never re-simulated, only recomputed from the latest
/// base angle plus the accumulated delta. Cheap, so it is unconditional.
pub fn cl_predict_angles(cl: &mut ClientState) {
    for i in 0..3 {
        cl.predicted_angles[i] =
            cl.viewangles[i] + short2angle(cl.frame.ps.pmove.delta_angles[i]);
    }
}

// ============================================================
// Reconciliation
// ============================================================

/// Compare an authoritative snapshot against what we predicted for the
/// same input sequence number, and store a fraction of the difference
/// as a decaying visual correction.
pub fn cl_check_prediction_error(
    cl: &mut ClientState,
    cls: &ClientStatic,
    sv_paused: bool,
    cl_predict: bool,
    cl_showmiss: bool,
) {
    if cls.demo_playback {
        return;
    }

    if sv_paused {
        cl.prediction_error = VEC3_ORIGIN;
        return;
    }

    if !cl_predict || cl.frame.ps.pmove.pm_flags.contains(PmFlags::NO_PREDICTION) {
        return;
    }

    // the last command the server has processed
    let frame = (cls.netchan.incoming_acknowledged as usize) & CMD_MASK;
    let cmd = cl.history[frame].cmd_number;
    let slot = (cmd as usize) & CMD_MASK;

    // compare what the server returned with what we had predicted
    let mut delta = [0i32; 3];
    for i in 0..3 {
        delta[i] = cl.frame.ps.pmove.origin[i] as i32 - cl.predicted_origins[slot][i] as i32;
    }

    let len = delta[0].abs() + delta[1].abs() + delta[2].abs();
    if len <= PREDICTION_NOISE || len > PREDICTION_TELEPORT {
        // noise, or an intentional discontinuity; nothing to smooth
        cl.prediction_error = VEC3_ORIGIN;
        return;
    }

    if cl_showmiss {
        com_dprintf(&format!(
            "prediction miss on {}: {} ({} {} {})\n",
            cl.frame.number, len, delta[0], delta[1], delta[2]
        ));
    }

    // don't replay an already-elapsed step against corrected data;
    // this marker moves before the ring slot is overwritten
    if cl.predicted_step_frame <= cmd {
        cl.predicted_step_frame = cmd + 1;
    }

    // future replays build on the corrected history
    cl.predicted_origins[slot] = cl.frame.ps.pmove.origin;

    // save for error interpolation
    for i in 0..3 {
        cl.prediction_error[i] = delta[i] as f32 * 0.125;
    }
}

// ============================================================
// Prediction
// ============================================================

/// Produce the best-guess pose for the upcoming render frame by
/// replaying every unacknowledged command, plus the in-progress pending
/// command, from the latest authoritative movement state.
pub fn cl_predict_movement(
    cl: &mut ClientState,
    cls: &ClientStatic,
    sv_paused: bool,
    cl_predict: bool,
    cl_showmiss: bool,
    pmp: &MoveParams,
    world: &impl WorldQuery,
) {
    if cls.state != ConnState::Active {
        return;
    }

    if cls.demo_playback {
        return;
    }

    if sv_paused {
        return;
    }

    if !cl_predict || cl.frame.ps.pmove.pm_flags.contains(PmFlags::NO_PREDICTION) {
        // just set angles
        cl_predict_angles(cl);
        return;
    }

    let mut ack =
        cl.history[(cls.netchan.incoming_acknowledged as usize) & CMD_MASK].cmd_number;
    let current = cl.cmd_number;

    // if we are too far out of date, just freeze; the slots between ack
    // and current have been overwritten and must not be replayed
    if current.wrapping_sub(ack) > (CMD_BACKUP - 1) as u32 {
        if cl_showmiss {
            com_dprintf(&format!("{}: exceeded CMD_BACKUP\n", cl.frame.number));
        }
        return;
    }

    if cl.cmd.msec == 0 && current == ack {
        if cl_showmiss {
            com_dprintf(&format!("{}: not moved\n", cl.frame.number));
        }
        return;
    }

    // start over from the authoritative movement state
    let mut pm = PmoveData {
        s: cl.frame.ps.pmove,
        snapinitial: true,
        ..PmoveData::default()
    };
    pm.clip_mask = if matches!(pm.s.pm_type, PmType::Dead | PmType::Gib) {
        MASK_DEADSOLID
    } else {
        MASK_PLAYERSOLID
    };

    // run frames
    while ack < current {
        ack += 1;
        let slot = (ack as usize) & CMD_MASK;
        pm.cmd = cl.cmds[slot];
        pmove(&mut pm, pmp, world);
        pm.snapinitial = false;

        // record so later snapshots can be checked against it
        cl.predicted_origins[slot] = pm.s.origin;
    }

    // run the pending command
    let frame: u32;
    if cl.cmd.msec != 0 {
        pm.cmd = cl.cmd;
        pm.cmd.forwardmove = cl.localmove[0];
        pm.cmd.sidemove = cl.localmove[1];
        pm.cmd.upmove = cl.localmove[2];
        pmove(&mut pm, pmp, world);
        frame = current;

        cl.predicted_origins[((current + 1) as usize) & CMD_MASK] = pm.s.origin;
    } else {
        frame = current - 1;
    }

    // stair step smoothing
    if pm.s.pm_type != PmType::Spectator && pm.s.pm_flags.contains(PmFlags::ON_GROUND) {
        let oldz = cl.predicted_origins[(cl.predicted_step_frame as usize) & CMD_MASK][2] as i32;
        let step = pm.s.origin[2] as i32 - oldz;
        if (STEP_MIN..STEP_MAX).contains(&step) {
            // check for stepping up before a previous step is completed
            let age = cls.realtime.wrapping_sub(cl.predicted_step_time);
            let prev_step = if age < STEP_DECAY_MS {
                cl.predicted_step * (STEP_DECAY_MS - age) as f32 * 0.01
            } else {
                0.0
            };

            cl.predicted_step = (prev_step + step as f32 * 0.125).min(STEP_LIMIT);
            cl.predicted_step_time = cls.realtime;
            cl.predicted_step_frame = frame + 1; // don't double step
        }
    }

    if cl.predicted_step_frame < frame {
        cl.predicted_step_frame = frame;
    }

    // copy results out for rendering
    for i in 0..3 {
        cl.predicted_origin[i] = pm.s.origin[i] as f32 * 0.125;
        cl.predicted_velocity[i] = pm.s.velocity[i] as f32 * 0.125;
    }
    cl.predicted_angles = pm.viewangles;
}

// ============================================================
// Client world-query composition
// ============================================================

/// BSP collision capability supplied by the collision subsystem.
pub trait CollisionModel {
    fn box_trace(
        &self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: i32,
        contentmask: i32,
    ) -> Trace;
    #[allow(clippy::too_many_arguments)]
    fn transformed_box_trace(
        &self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: i32,
        contentmask: i32,
        origin: &Vec3,
        angles: &Vec3,
    ) -> Trace;
    fn point_contents(&self, point: &Vec3, headnode: i32) -> i32;
    fn transformed_point_contents(
        &self,
        point: &Vec3,
        headnode: i32,
        origin: &Vec3,
        angles: &Vec3,
    ) -> i32;
    fn headnode_for_box(&self, mins: &Vec3, maxs: &Vec3) -> i32;
}

/// The movement code's view of the client's world: the BSP plus the
/// snapshot's solid entities.
pub struct ClientWorld<'a, M: CollisionModel> {
    pub cm: &'a M,
    pub solids: &'a [SolidEntity],
    /// Headnode per inline model index; 0 when not loaded.
    pub model_clip: &'a [i32],
    pub playernum: i32,
}

impl<M: CollisionModel> ClientWorld<'_, M> {
    fn clip_to_entities(
        &self,
        tr: &mut Trace,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        contentmask: i32,
    ) {
        for ent in self.solids {
            if ent.solid == 0 {
                continue;
            }
            // never clip against the local player
            if ent.number == self.playernum + 1 {
                continue;
            }
            if tr.allsolid {
                return;
            }

            let (headnode, angles) = if ent.solid == 31 {
                // inline bsp submodel
                let Some(&headnode) = self.model_clip.get(ent.modelindex) else {
                    continue;
                };
                if headnode == 0 {
                    continue;
                }
                (headnode, ent.angles)
            } else {
                // encoded bounding box
                let x = 8 * (ent.solid & 31);
                let zd = 8 * ((ent.solid >> 5) & 31);
                let zu = 8 * ((ent.solid >> 10) & 63) - 32;
                let bmins = [-(x as f32), -(x as f32), -(zd as f32)];
                let bmaxs = [x as f32, x as f32, zu as f32];
                // boxes don't rotate
                (self.cm.headnode_for_box(&bmins, &bmaxs), VEC3_ORIGIN)
            };

            let trace = self.cm.transformed_box_trace(
                start,
                end,
                mins,
                maxs,
                headnode,
                contentmask,
                &ent.origin,
                &angles,
            );

            if trace.allsolid || trace.startsolid || trace.fraction < tr.fraction {
                let was_startsolid = tr.startsolid;
                *tr = trace;
                tr.ent = ent.number;
                if was_startsolid {
                    tr.startsolid = true;
                }
            } else if trace.startsolid {
                tr.startsolid = true;
            }
        }
    }
}

impl<M: CollisionModel> WorldQuery for ClientWorld<'_, M> {
    fn trace(
        &self,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        contentmask: i32,
    ) -> Trace {
        // check against world
        let mut t = self.cm.box_trace(start, end, mins, maxs, 0, contentmask);
        if t.fraction < 1.0 {
            t.ent = 0;
        }
        if t.fraction == 0.0 {
            return t; // blocked by the world
        }

        // check all other solid models
        self.clip_to_entities(&mut t, start, mins, maxs, end, contentmask);
        t
    }

    fn point_contents(&self, point: &Vec3) -> i32 {
        let mut contents = self.cm.point_contents(point, 0);

        for ent in self.solids {
            if ent.solid != 31 {
                continue;
            }
            let Some(&headnode) = self.model_clip.get(ent.modelindex) else {
                continue;
            };
            if headnode == 0 {
                continue;
            }
            contents |=
                self.cm
                    .transformed_point_contents(point, headnode, &ent.origin, &ent.angles);
        }

        contents
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use strafe_common::shared::{angle2short, CPlane, CSurface, UserCmd, CONTENTS_SOLID};

    /// Open air, gravity does whatever it wants.
    struct OpenAir;

    impl WorldQuery for OpenAir {
        fn trace(&self, _s: &Vec3, _mins: &Vec3, _maxs: &Vec3, end: &Vec3, _m: i32) -> Trace {
            Trace {
                endpos: *end,
                ..Trace::default()
            }
        }
        fn point_contents(&self, _point: &Vec3) -> i32 {
            0
        }
    }

    /// Solid floor at z=0; a box with mins_z = -24 rests at origin z=24.
    struct Floor;

    impl WorldQuery for Floor {
        fn trace(&self, start: &Vec3, mins: &Vec3, _maxs: &Vec3, end: &Vec3, _m: i32) -> Trace {
            let rest = -mins[2];
            if start[2] < rest - 0.001 {
                return Trace {
                    allsolid: true,
                    startsolid: true,
                    fraction: 0.0,
                    endpos: *start,
                    ..Trace::default()
                };
            }
            if end[2] < rest {
                let frac = if (start[2] - end[2]).abs() > f32::EPSILON {
                    ((start[2] - rest) / (start[2] - end[2])).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                Trace {
                    fraction: frac,
                    endpos: [
                        start[0] + frac * (end[0] - start[0]),
                        start[1] + frac * (end[1] - start[1]),
                        rest,
                    ],
                    plane: CPlane {
                        normal: [0.0, 0.0, 1.0],
                        ..CPlane::default()
                    },
                    surface: Some(CSurface::default()),
                    contents: CONTENTS_SOLID,
                    ent: 0,
                    ..Trace::default()
                }
            } else {
                Trace {
                    endpos: *end,
                    ..Trace::default()
                }
            }
        }
        fn point_contents(&self, point: &Vec3) -> i32 {
            if point[2] < 0.0 {
                CONTENTS_SOLID
            } else {
                0
            }
        }
    }

    /// Client with ack mapped to cmd 10, three unsent commands walking
    /// forward, and an active connection.
    fn walking_setup() -> (ClientState, ClientStatic) {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        cls.state = ConnState::Active;
        cls.realtime = 20000;
        cls.netchan.incoming_acknowledged = 5;

        cl.history[5].cmd_number = 10;
        cl.cmd_number = 12;

        let walk = UserCmd {
            msec: 25,
            forwardmove: 200,
            ..UserCmd::default()
        };
        for slot in [11usize, 12] {
            cl.cmds[slot] = walk;
        }
        cl.cmd = UserCmd {
            msec: 25,
            ..UserCmd::default()
        };
        cl.localmove = [200, 0, 0];

        cl.frame.ps.pmove.origin = [0, 0, 800];
        cl.frame.ps.pmove.gravity = 0;
        (cl, cls)
    }

    // -------------------------------------------------------
    // Skip conditions
    // -------------------------------------------------------

    #[test]
    fn test_predict_requires_active_connection() {
        let (mut cl, mut cls) = walking_setup();
        cls.state = ConnState::Connected;
        cl.predicted_origin = [9.0; 3];
        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);
        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    #[test]
    fn test_predict_skips_demo_playback() {
        let (mut cl, mut cls) = walking_setup();
        cls.demo_playback = true;
        cl.predicted_origin = [9.0; 3];
        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);
        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    #[test]
    fn test_predict_skips_when_paused() {
        let (mut cl, cls) = walking_setup();
        cl.predicted_origin = [9.0; 3];
        cl_predict_movement(&mut cl, &cls, true, true, false, &MoveParams::default(), &OpenAir);
        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    #[test]
    fn test_predict_disabled_still_predicts_angles() {
        let (mut cl, cls) = walking_setup();
        cl.viewangles = [10.0, 20.0, 30.0];
        cl.frame.ps.pmove.delta_angles = [angle2short(5.0), 0, 0];
        cl.predicted_origin = [9.0; 3];

        cl_predict_movement(&mut cl, &cls, false, false, false, &MoveParams::default(), &OpenAir);

        assert_eq!(cl.predicted_origin, [9.0; 3]); // no simulation
        assert!((cl.predicted_angles[0] - 15.0).abs() < 0.01);
        assert!((cl.predicted_angles[1] - 20.0).abs() < 0.01);
        assert!((cl.predicted_angles[2] - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_predict_no_prediction_flag_behaves_like_disabled() {
        let (mut cl, cls) = walking_setup();
        cl.frame.ps.pmove.pm_flags = PmFlags::NO_PREDICTION;
        cl.predicted_origin = [9.0; 3];
        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);
        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    // -------------------------------------------------------
    // Replay
    // -------------------------------------------------------

    #[test]
    fn test_predict_replays_unacked_and_pending_commands() {
        let (mut cl, cls) = walking_setup();

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);

        // slots 11 and 12 hold per-sequence results; 13 holds the
        // pending command's result
        let x11 = cl.predicted_origins[11][0];
        let x12 = cl.predicted_origins[12][0];
        let x13 = cl.predicted_origins[13][0];
        assert!(x11 > 0, "x11={}", x11);
        assert!(x12 > x11);
        assert!(x13 > x12);

        // the published pose is the pending command's result
        assert!((cl.predicted_origin[0] - x13 as f32 * 0.125).abs() < 0.001);
        assert!(cl.predicted_velocity[0] > 0.0);
    }

    #[test]
    fn test_predict_without_pending_command_stops_at_current() {
        let (mut cl, cls) = walking_setup();
        cl.cmd.msec = 0;

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);

        let x12 = cl.predicted_origins[12][0];
        assert!(x12 > 0);
        assert_eq!(cl.predicted_origins[13], [0; 3]);
        assert!((cl.predicted_origin[0] - x12 as f32 * 0.125).abs() < 0.001);
    }

    #[test]
    fn test_predict_freezes_when_too_far_out_of_date() {
        let (mut cl, cls) = walking_setup();
        cl.cmd_number = 10 + CMD_BACKUP as u32; // gap of CMD_BACKUP
        cl.predicted_origin = [9.0; 3];

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);

        // frozen: no simulation, no extrapolation
        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    #[test]
    fn test_predict_not_moved_early_out() {
        let (mut cl, cls) = walking_setup();
        cl.cmd_number = 10; // nothing unacknowledged
        cl.cmd.msec = 0;
        cl.predicted_origin = [9.0; 3];

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &OpenAir);

        assert_eq!(cl.predicted_origin, [9.0; 3]);
    }

    // -------------------------------------------------------
    // Step smoothing
    // -------------------------------------------------------

    /// Standing on the floor at origin z=24 (192 fixed).
    fn grounded_setup() -> (ClientState, ClientStatic) {
        let (mut cl, cls) = walking_setup();
        cl.frame.ps.pmove.origin = [0, 0, 192];
        cl.frame.ps.pmove.pm_flags = PmFlags::ON_GROUND;
        (cl, cls)
    }

    #[test]
    fn test_step_smoothing_records_step() {
        let (mut cl, cls) = grounded_setup();
        // last smoothed frame saw us 12 world units (96 fixed) lower
        cl.predicted_step_frame = 3;
        cl.predicted_origins[3] = [0, 0, 192 - 96];
        cl.predicted_step_time = 0; // long ago; no decay blend

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &Floor);

        assert!(
            (cl.predicted_step - 12.0).abs() < 0.3,
            "step={}",
            cl.predicted_step
        );
        assert_eq!(cl.predicted_step_time, cls.realtime);
        // marker set past the simulated frame
        assert_eq!(cl.predicted_step_frame, 13);
    }

    #[test]
    fn test_step_smoothing_blends_decaying_previous_step() {
        let (mut cl, cls) = grounded_setup();
        cl.predicted_step_frame = 3;
        cl.predicted_origins[3] = [0, 0, 192 - 96];
        // previous 8-unit step, half decayed (50ms of 100ms ago)
        cl.predicted_step = 8.0;
        cl.predicted_step_time = cls.realtime - 50;

        cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &Floor);

        // 8 * 0.5 + 12 = 16
        assert!(
            (cl.predicted_step - 16.0).abs() < 0.3,
            "step={}",
            cl.predicted_step
        );
    }

    #[test]
    fn test_step_smoothing_ignores_small_and_huge_displacements() {
        for oldz in [192 - 8, 192 - 400] {
            let (mut cl, cls) = grounded_setup();
            cl.predicted_step_frame = 3;
            cl.predicted_origins[3] = [0, 0, oldz];
            cl.predicted_step = 0.0;

            cl_predict_movement(&mut cl, &cls, false, true, false, &MoveParams::default(), &Floor);

            assert_eq!(cl.predicted_step, 0.0, "oldz={}", oldz);
            // marker still advances to the simulated frame
            assert_eq!(cl.predicted_step_frame, 12);
        }
    }

    // -------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------

    /// Ack frame 5 maps to command 20; server reports `server_origin`
    /// against a zero prediction recorded in slot 20.
    fn recon_setup(server_origin: [i16; 3]) -> (ClientState, ClientStatic) {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        cls.state = ConnState::Active;
        cls.netchan.incoming_acknowledged = 5;
        cl.history[5].cmd_number = 20;
        cl.predicted_origins[20] = [0, 0, 0];
        cl.frame.ps.pmove.origin = server_origin;
        cl.frame.number = 100;
        (cl, cls)
    }

    #[test]
    fn test_reconcile_stores_eighth_of_delta_and_corrects_ring() {
        let (mut cl, cls) = recon_setup([80, -16, 8]);
        cl.predicted_step_frame = 5;

        cl_check_prediction_error(&mut cl, &cls, false, true, false);

        assert_eq!(cl.prediction_error, [10.0, -2.0, 1.0]);
        // ring slot overwritten with the authoritative origin
        assert_eq!(cl.predicted_origins[20], [80, -16, 8]);
        // step marker frozen past the corrected frame
        assert_eq!(cl.predicted_step_frame, 21);
    }

    #[test]
    fn test_reconcile_marker_not_moved_backward() {
        let (mut cl, cls) = recon_setup([80, 0, 0]);
        cl.predicted_step_frame = 30;

        cl_check_prediction_error(&mut cl, &cls, false, true, false);

        assert_eq!(cl.predicted_step_frame, 30);
    }

    #[test]
    fn test_reconcile_noise_floor_clears_error() {
        let (mut cl, cls) = recon_setup([1, 0, 0]); // manhattan 1 <= noise
        cl.prediction_error = [5.0; 3];

        cl_check_prediction_error(&mut cl, &cls, false, true, false);

        assert_eq!(cl.prediction_error, VEC3_ORIGIN);
        // slot untouched on a discard
        assert_eq!(cl.predicted_origins[20], [0, 0, 0]);
    }

    #[test]
    fn test_reconcile_teleport_clears_error() {
        let (mut cl, cls) = recon_setup([641, 0, 0]);
        cl.prediction_error = [5.0; 3];

        cl_check_prediction_error(&mut cl, &cls, false, true, false);

        assert_eq!(cl.prediction_error, VEC3_ORIGIN);
    }

    #[test]
    fn test_reconcile_boundary_values_are_misses() {
        // manhattan 2 and 640 are both real misses
        for origin in [[2, 0, 0], [640, 0, 0]] {
            let (mut cl, cls) = recon_setup(origin);
            cl_check_prediction_error(&mut cl, &cls, false, true, false);
            assert!(
                (cl.prediction_error[0] - origin[0] as f32 * 0.125).abs() < 0.001,
                "origin={:?}",
                origin
            );
        }
    }

    #[test]
    fn test_reconcile_pause_clears_error() {
        let (mut cl, cls) = recon_setup([80, 0, 0]);
        cl.prediction_error = [5.0; 3];

        cl_check_prediction_error(&mut cl, &cls, true, true, false);

        assert_eq!(cl.prediction_error, VEC3_ORIGIN);
        assert_eq!(cl.predicted_origins[20], [0, 0, 0]);
    }

    #[test]
    fn test_reconcile_skips_demo_playback() {
        let (mut cl, mut cls) = recon_setup([80, 0, 0]);
        cls.demo_playback = true;
        cl.prediction_error = [5.0; 3];

        cl_check_prediction_error(&mut cl, &cls, false, true, false);

        assert_eq!(cl.prediction_error, [5.0; 3]);
    }

    // -------------------------------------------------------
    // ClientWorld composition
    // -------------------------------------------------------

    /// Flat world trace plus recorded transformed-trace calls.
    struct StubCm {
        world_fraction: f32,
        entity_fraction: f32,
        headnode: i32,
        panic_on_entity_trace: bool,
    }

    impl StubCm {
        fn open() -> Self {
            Self {
                world_fraction: 1.0,
                entity_fraction: 1.0,
                headnode: 42,
                panic_on_entity_trace: false,
            }
        }
    }

    impl CollisionModel for StubCm {
        fn box_trace(
            &self,
            _s: &Vec3,
            end: &Vec3,
            _mins: &Vec3,
            _maxs: &Vec3,
            _hn: i32,
            _m: i32,
        ) -> Trace {
            Trace {
                fraction: self.world_fraction,
                endpos: *end,
                ..Trace::default()
            }
        }
        fn transformed_box_trace(
            &self,
            _s: &Vec3,
            end: &Vec3,
            _mins: &Vec3,
            _maxs: &Vec3,
            headnode: i32,
            _m: i32,
            _o: &Vec3,
            _a: &Vec3,
        ) -> Trace {
            if self.panic_on_entity_trace {
                panic!("entity trace should not run");
            }
            assert_eq!(headnode, self.headnode);
            Trace {
                fraction: self.entity_fraction,
                endpos: *end,
                ..Trace::default()
            }
        }
        fn point_contents(&self, _p: &Vec3, _hn: i32) -> i32 {
            CONTENTS_SOLID
        }
        fn transformed_point_contents(&self, _p: &Vec3, _hn: i32, _o: &Vec3, _a: &Vec3) -> i32 {
            8 // lava, to see the OR
        }
        fn headnode_for_box(&self, mins: &Vec3, maxs: &Vec3) -> i32 {
            // 5-5-6 decode of solid = 2 | (3 << 5) | (8 << 10)
            assert_eq!(*mins, [-16.0, -16.0, -24.0]);
            assert_eq!(*maxs, [16.0, 16.0, 32.0]);
            self.headnode
        }
    }

    fn boxed_entity(number: i32) -> SolidEntity {
        SolidEntity {
            number,
            solid: 2 | (3 << 5) | (8 << 10),
            ..SolidEntity::default()
        }
    }

    #[test]
    fn test_client_world_decodes_boxes_and_clips() {
        let cm = StubCm {
            entity_fraction: 0.4,
            ..StubCm::open()
        };
        let solids = [boxed_entity(7)];
        let world = ClientWorld {
            cm: &cm,
            solids: &solids,
            model_clip: &[],
            playernum: 0,
        };

        let t = world.trace(
            &[0.0; 3],
            &[-16.0, -16.0, -24.0],
            &[16.0, 16.0, 32.0],
            &[100.0, 0.0, 0.0],
            MASK_PLAYERSOLID,
        );
        assert_eq!(t.fraction, 0.4);
        assert_eq!(t.ent, 7);
    }

    #[test]
    fn test_client_world_skips_local_player_and_nonsolid() {
        let cm = StubCm {
            panic_on_entity_trace: true,
            ..StubCm::open()
        };
        let solids = [
            SolidEntity {
                number: 3,
                solid: 0,
                ..SolidEntity::default()
            },
            boxed_entity(5), // playernum 4 -> entity 5 is us
        ];
        let world = ClientWorld {
            cm: &cm,
            solids: &solids,
            model_clip: &[],
            playernum: 4,
        };

        let t = world.trace(
            &[0.0; 3],
            &[-1.0; 3],
            &[1.0; 3],
            &[100.0, 0.0, 0.0],
            MASK_PLAYERSOLID,
        );
        assert_eq!(t.fraction, 1.0);
        assert_eq!(t.ent, -1);
    }

    #[test]
    fn test_client_world_blocked_by_world_short_circuits() {
        let cm = StubCm {
            world_fraction: 0.0,
            panic_on_entity_trace: true,
            ..StubCm::open()
        };
        let solids = [boxed_entity(7)];
        let world = ClientWorld {
            cm: &cm,
            solids: &solids,
            model_clip: &[],
            playernum: 0,
        };

        let t = world.trace(
            &[0.0; 3],
            &[-1.0; 3],
            &[1.0; 3],
            &[100.0, 0.0, 0.0],
            MASK_PLAYERSOLID,
        );
        assert_eq!(t.fraction, 0.0);
        assert_eq!(t.ent, 0); // the world entity
    }

    #[test]
    fn test_client_world_point_contents_ors_submodels() {
        let cm = StubCm::open();
        let solids = [SolidEntity {
            number: 9,
            solid: 31,
            modelindex: 1,
            ..SolidEntity::default()
        }];
        let world = ClientWorld {
            cm: &cm,
            solids: &solids,
            model_clip: &[0, 5],
            playernum: 0,
        };

        let contents = world.point_contents(&[0.0; 3]);
        assert_eq!(contents, CONTENTS_SOLID | 8);
    }

    #[test]
    fn test_client_world_submodel_without_clip_data_skipped() {
        let cm = StubCm {
            panic_on_entity_trace: true,
            ..StubCm::open()
        };
        let solids = [SolidEntity {
            number: 9,
            solid: 31,
            modelindex: 3,
            ..SolidEntity::default()
        }];
        let world = ClientWorld {
            cm: &cm,
            solids: &solids,
            model_clip: &[0, 5], // index 3 out of range
            playernum: 0,
        };

        let t = world.trace(
            &[0.0; 3],
            &[-1.0; 3],
            &[1.0; 3],
            &[100.0, 0.0, 0.0],
            MASK_PLAYERSOLID,
        );
        assert_eq!(t.fraction, 1.0);
    }
}
