// pmove.rs — shared deterministic player movement
//
// Both the server and the predicting client run this exact step, so any
// divergence here shows up as a prediction miss. Everything is a pure
// function of PmoveData + MoveParams + the world-query results.

use crate::shared::{
    angle_vectors, cross_product, dot_product, short2angle, vector_length, vector_normalize,
    vector_scale, CPlane, CSurface, PmFlags, PmType, PmoveData, Trace, Vec3, CONTENTS_CURRENT_0,
    CONTENTS_CURRENT_180, CONTENTS_CURRENT_270, CONTENTS_CURRENT_90, CONTENTS_CURRENT_DOWN,
    CONTENTS_CURRENT_UP, CONTENTS_SLIME, CONTENTS_SOLID, CONTENTS_WATER, MASK_CURRENT, MASK_WATER,
    MAXTOUCH, MAX_CLIP_PLANES, PITCH, SURF_SLICK, VEC3_ORIGIN, YAW,
};

pub const STEPSIZE: f32 = 18.0;
const STOP_EPSILON: f32 = 0.1;
const MIN_STEP_NORMAL: f32 = 0.7;

// ============================================================
// World-query capability
// ============================================================

/// Collision capability the movement code consumes. Supplied by the
/// server's world model or the client's snapshot composition; movement
/// never sees BSP internals.
pub trait WorldQuery {
    fn trace(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3, contentmask: i32)
        -> Trace;
    fn point_contents(&self, point: &Vec3) -> i32;
}

// ============================================================
// Movement parameters, shared between client and server
// ============================================================

#[derive(Debug, Clone, Copy)]
pub struct MoveParams {
    pub stop_speed: f32,
    pub max_speed: f32,
    pub duck_speed: f32,
    pub accelerate: f32,
    pub air_accelerate: f32,
    pub water_accelerate: f32,
    pub friction: f32,
    pub water_friction: f32,
    pub water_speed: f32,
}

impl Default for MoveParams {
    fn default() -> Self {
        Self {
            stop_speed: 100.0,
            max_speed: 300.0,
            duck_speed: 100.0,
            accelerate: 10.0,
            air_accelerate: 0.0,
            water_accelerate: 10.0,
            friction: 6.0,
            water_friction: 1.0,
            water_speed: 400.0,
        }
    }
}

// ============================================================
// Per-call local state
// ============================================================

#[derive(Clone, Default)]
struct PmLocal {
    origin: Vec3,
    velocity: Vec3,

    forward: Vec3,
    right: Vec3,
    up: Vec3,
    frametime: f32,

    groundplane: CPlane,
    groundsurface: Option<CSurface>,
    groundcontents: i32,

    previous_origin: [i16; 3],
}

/// Slide off of the impacting surface.
fn clip_velocity(inv: &Vec3, normal: &Vec3, overbounce: f32) -> Vec3 {
    let backoff = dot_product(inv, normal) * overbounce;
    let mut out = VEC3_ORIGIN;
    for i in 0..3 {
        out[i] = inv[i] - normal[i] * backoff;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    out
}

struct PmoveContext<'a, W: WorldQuery> {
    pm: &'a mut PmoveData,
    pmp: &'a MoveParams,
    pml: PmLocal,
    world: &'a W,
}

impl<'a, W: WorldQuery> PmoveContext<'a, W> {
    fn trace(&self, start: &Vec3, end: &Vec3) -> Trace {
        self.world
            .trace(start, &self.pm.mins, &self.pm.maxs, end, self.pm.clip_mask)
    }

    fn touch(&mut self, ent: i32) {
        if self.pm.numtouch < MAXTOUCH && ent >= 0 {
            self.pm.touchents[self.pm.numtouch] = ent;
            self.pm.numtouch += 1;
        }
    }

    // --------------------------------------------------------
    // Slide movement
    // --------------------------------------------------------

    fn slide_move(&mut self) {
        let numbumps = 4;
        let primal_velocity = self.pml.velocity;
        let mut planes = [VEC3_ORIGIN; MAX_CLIP_PLANES];
        let mut numplanes = 0usize;
        let mut time_left = self.pml.frametime;

        for _ in 0..numbumps {
            let end = [
                self.pml.origin[0] + time_left * self.pml.velocity[0],
                self.pml.origin[1] + time_left * self.pml.velocity[1],
                self.pml.origin[2] + time_left * self.pml.velocity[2],
            ];

            let trace = self.trace(&self.pml.origin, &end);

            if trace.allsolid {
                // trapped in a solid; keep horizontal control
                self.pml.velocity[2] = 0.0;
                return;
            }

            if trace.fraction > 0.0 {
                self.pml.origin = trace.endpos;
                numplanes = 0;
            }

            if trace.fraction == 1.0 {
                break; // moved the entire distance
            }

            self.touch(trace.ent);

            time_left -= time_left * trace.fraction;

            if numplanes >= MAX_CLIP_PLANES {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
            planes[numplanes] = trace.plane.normal;
            numplanes += 1;

            // clip velocity so it parallels all touched planes
            let mut ok = false;
            for i in 0..numplanes {
                let clipped = clip_velocity(&self.pml.velocity, &planes[i], 1.01);
                self.pml.velocity = clipped;
                if (0..numplanes)
                    .all(|j| j == i || dot_product(&self.pml.velocity, &planes[j]) >= 0.0)
                {
                    ok = true;
                    break;
                }
            }

            if !ok {
                // go along the crease between two planes, or stop dead
                if numplanes != 2 {
                    self.pml.velocity = VEC3_ORIGIN;
                    break;
                }
                let dir = cross_product(&planes[0], &planes[1]);
                let d = dot_product(&dir, &self.pml.velocity);
                self.pml.velocity = vector_scale(&dir, d);
            }

            // never turn against the original direction
            if dot_product(&self.pml.velocity, &primal_velocity) <= 0.0 {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
        }

        if self.pm.s.pm_time != 0 {
            self.pml.velocity = primal_velocity;
        }
    }

    /// Slide move with a stair-step retry: try again from STEPSIZE up
    /// and keep whichever attempt traveled farther.
    fn step_slide_move(&mut self) {
        let start_o = self.pml.origin;
        let start_v = self.pml.velocity;

        self.slide_move();

        let down_o = self.pml.origin;
        let down_v = self.pml.velocity;

        let mut up = start_o;
        up[2] += STEPSIZE;

        let trace = self.trace(&up, &up);
        if trace.allsolid {
            return; // can't step up
        }

        self.pml.origin = up;
        self.pml.velocity = start_v;
        self.slide_move();

        // push down the final amount
        let mut down = self.pml.origin;
        down[2] -= STEPSIZE;
        let trace = self.trace(&self.pml.origin, &down);
        if !trace.allsolid {
            self.pml.origin = trace.endpos;
        }
        let up_o = self.pml.origin;

        let down_dist = (down_o[0] - start_o[0]).powi(2) + (down_o[1] - start_o[1]).powi(2);
        let up_dist = (up_o[0] - start_o[0]).powi(2) + (up_o[1] - start_o[1]).powi(2);

        if down_dist > up_dist || trace.plane.normal[2] < MIN_STEP_NORMAL {
            self.pml.origin = down_o;
            self.pml.velocity = down_v;
            return;
        }
        // walking up a step keeps the horizontal z velocity
        self.pml.velocity[2] = down_v[2];
    }

    // --------------------------------------------------------
    // Friction and acceleration
    // --------------------------------------------------------

    fn friction(&mut self) {
        let speed = vector_length(&self.pml.velocity);
        if speed < 1.0 {
            self.pml.velocity[0] = 0.0;
            self.pml.velocity[1] = 0.0;
            return;
        }

        let mut drop = 0.0f32;

        let slick = self
            .pml
            .groundsurface
            .as_ref()
            .is_some_and(|s| (s.flags & SURF_SLICK) != 0);
        if self.pm.groundentity >= 0 && self.pml.groundsurface.is_some() && !slick {
            let control = speed.max(self.pmp.stop_speed);
            drop += control * self.pmp.friction * self.pml.frametime;
        }

        if self.pm.waterlevel != 0 {
            drop += speed
                * self.pmp.water_friction
                * self.pm.waterlevel as f32
                * self.pml.frametime;
        }

        let newspeed = (speed - drop).max(0.0) / speed;
        self.pml.velocity = vector_scale(&self.pml.velocity, newspeed);
    }

    fn accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let currentspeed = dot_product(&self.pml.velocity, wishdir);
        let addspeed = wishspeed - currentspeed;
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * self.pml.frametime * wishspeed).min(addspeed);
        for i in 0..3 {
            self.pml.velocity[i] += accelspeed * wishdir[i];
        }
    }

    fn air_accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let wishspd = wishspeed.min(30.0);
        let currentspeed = dot_product(&self.pml.velocity, wishdir);
        let addspeed = wishspd - currentspeed;
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * wishspeed * self.pml.frametime).min(addspeed);
        for i in 0..3 {
            self.pml.velocity[i] += accelspeed * wishdir[i];
        }
    }

    fn add_water_currents(&self, wishvel: &mut Vec3) {
        if (self.pm.watertype & MASK_CURRENT) == 0 {
            return;
        }

        let mut v = VEC3_ORIGIN;
        if (self.pm.watertype & CONTENTS_CURRENT_0) != 0 {
            v[0] += 1.0;
        }
        if (self.pm.watertype & CONTENTS_CURRENT_90) != 0 {
            v[1] += 1.0;
        }
        if (self.pm.watertype & CONTENTS_CURRENT_180) != 0 {
            v[0] -= 1.0;
        }
        if (self.pm.watertype & CONTENTS_CURRENT_270) != 0 {
            v[1] -= 1.0;
        }
        if (self.pm.watertype & CONTENTS_CURRENT_UP) != 0 {
            v[2] += 1.0;
        }
        if (self.pm.watertype & CONTENTS_CURRENT_DOWN) != 0 {
            v[2] -= 1.0;
        }

        let mut s = self.pmp.water_speed;
        if self.pm.waterlevel == 1 && self.pm.groundentity >= 0 {
            s /= 2.0;
        }
        for i in 0..3 {
            wishvel[i] += s * v[i];
        }
    }

    // --------------------------------------------------------
    // Movement modes
    // --------------------------------------------------------

    fn water_move(&mut self) {
        let fm = self.pm.cmd.forwardmove as f32;
        let sm = self.pm.cmd.sidemove as f32;

        let mut wishvel = VEC3_ORIGIN;
        for i in 0..3 {
            wishvel[i] = self.pml.forward[i] * fm + self.pml.right[i] * sm;
        }

        if self.pm.cmd.forwardmove == 0 && self.pm.cmd.sidemove == 0 && self.pm.cmd.upmove == 0 {
            wishvel[2] -= 60.0; // drift towards bottom
        } else {
            wishvel[2] += self.pm.cmd.upmove as f32;
        }

        self.add_water_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let mut wishspeed = vector_normalize(&mut wishdir);
        if wishspeed > self.pmp.max_speed {
            wishspeed = self.pmp.max_speed;
        }
        wishspeed *= 0.5;

        self.accelerate(&wishdir, wishspeed, self.pmp.water_accelerate);
        self.step_slide_move();
    }

    fn air_move(&mut self) {
        let fm = self.pm.cmd.forwardmove as f32;
        let sm = self.pm.cmd.sidemove as f32;

        let mut wishvel = VEC3_ORIGIN;
        for i in 0..2 {
            wishvel[i] = self.pml.forward[i] * fm + self.pml.right[i] * sm;
        }
        wishvel[2] = 0.0;

        self.add_water_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let mut wishspeed = vector_normalize(&mut wishdir);

        let maxspeed = if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            self.pmp.duck_speed
        } else {
            self.pmp.max_speed
        };
        if wishspeed > maxspeed {
            wishspeed = maxspeed;
        }

        let gravity = self.pm.s.gravity as f32;

        if self.pm.groundentity >= 0 {
            // walking on ground
            self.pml.velocity[2] = 0.0;
            self.accelerate(&wishdir, wishspeed, self.pmp.accelerate);

            if gravity > 0.0 {
                self.pml.velocity[2] = 0.0;
            } else {
                self.pml.velocity[2] -= gravity * self.pml.frametime;
            }

            if self.pml.velocity[0] == 0.0 && self.pml.velocity[1] == 0.0 {
                return;
            }
            self.step_slide_move();
        } else {
            // airborne: little control
            if self.pmp.air_accelerate != 0.0 {
                self.air_accelerate(&wishdir, wishspeed, self.pmp.accelerate);
            } else {
                self.accelerate(&wishdir, wishspeed, 1.0);
            }
            self.pml.velocity[2] -= gravity * self.pml.frametime;
            self.step_slide_move();
        }
    }

    // --------------------------------------------------------
    // Position categorization
    // --------------------------------------------------------

    fn categorize_position(&mut self) {
        // solid ground under us?
        let mut point = self.pml.origin;
        point[2] -= 0.25;

        if self.pml.velocity[2] > 180.0 {
            self.pm.s.pm_flags.remove(PmFlags::ON_GROUND);
            self.pm.groundentity = -1;
        } else {
            let trace = self.trace(&self.pml.origin, &point);
            self.pml.groundplane = trace.plane;
            self.pml.groundsurface = trace.surface.clone();
            self.pml.groundcontents = trace.contents;

            if trace.ent < 0 || (trace.plane.normal[2] < 0.7 && !trace.startsolid) {
                self.pm.groundentity = -1;
                self.pm.s.pm_flags.remove(PmFlags::ON_GROUND);
            } else {
                self.pm.groundentity = trace.ent;

                // hitting solid ground ends a waterjump
                if self.pm.s.pm_flags.contains(PmFlags::TIME_WATERJUMP) {
                    self.pm.s.pm_flags.remove(
                        PmFlags::TIME_WATERJUMP | PmFlags::TIME_LAND | PmFlags::TIME_TELEPORT,
                    );
                    self.pm.s.pm_time = 0;
                }

                if !self.pm.s.pm_flags.contains(PmFlags::ON_GROUND) {
                    // just hit the ground
                    self.pm.s.pm_flags.insert(PmFlags::ON_GROUND);
                    // landing pause, except when running down a slope
                    if self.pml.velocity[2] < -200.0 {
                        self.pm.s.pm_flags.insert(PmFlags::TIME_LAND);
                        self.pm.s.pm_time = if self.pml.velocity[2] < -400.0 { 25 } else { 18 };
                    }
                }
            }

            self.touch(trace.ent);
        }

        // waterlevel, accounting for ducking
        self.pm.waterlevel = 0;
        self.pm.watertype = 0;

        let sample2 = self.pm.viewheight - self.pm.mins[2];
        let sample1 = sample2 / 2.0;

        let mut point = self.pml.origin;
        point[2] = self.pml.origin[2] + self.pm.mins[2] + 1.0;
        let cont = self.world.point_contents(&point);
        if (cont & MASK_WATER) != 0 {
            self.pm.watertype = cont;
            self.pm.waterlevel = 1;
            point[2] = self.pml.origin[2] + self.pm.mins[2] + sample1;
            if (self.world.point_contents(&point) & MASK_WATER) != 0 {
                self.pm.waterlevel = 2;
                point[2] = self.pml.origin[2] + self.pm.mins[2] + sample2;
                if (self.world.point_contents(&point) & MASK_WATER) != 0 {
                    self.pm.waterlevel = 3;
                }
            }
        }
    }

    // --------------------------------------------------------
    // Jumping
    // --------------------------------------------------------

    fn check_jump(&mut self) {
        if self.pm.s.pm_flags.contains(PmFlags::TIME_LAND) {
            // hasn't been long enough since landing
            return;
        }

        if self.pm.cmd.upmove < 10 {
            self.pm.s.pm_flags.remove(PmFlags::JUMP_HELD);
            return;
        }

        // must wait for jump to be released
        if self.pm.s.pm_flags.contains(PmFlags::JUMP_HELD) {
            return;
        }

        if self.pm.s.pm_type == PmType::Dead {
            return;
        }

        if self.pm.waterlevel >= 2 {
            // swimming, not jumping
            self.pm.groundentity = -1;
            if self.pml.velocity[2] <= -300.0 {
                return;
            }
            self.pml.velocity[2] = if self.pm.watertype == CONTENTS_WATER {
                100.0
            } else if self.pm.watertype == CONTENTS_SLIME {
                80.0
            } else {
                50.0
            };
            return;
        }

        if self.pm.groundentity < 0 {
            return; // in air, so no effect
        }

        self.pm.s.pm_flags.insert(PmFlags::JUMP_HELD);
        self.pm.groundentity = -1;
        self.pml.velocity[2] += 270.0;
        if self.pml.velocity[2] < 270.0 {
            self.pml.velocity[2] = 270.0;
        }
    }

    /// Launch out of water when swimming against a low ledge.
    fn check_water_jump(&mut self) {
        if self.pm.s.pm_time != 0 {
            return;
        }
        if self.pm.waterlevel != 2 {
            return;
        }

        let mut flatforward = [self.pml.forward[0], self.pml.forward[1], 0.0];
        vector_normalize(&mut flatforward);

        let mut spot = [
            self.pml.origin[0] + 30.0 * flatforward[0],
            self.pml.origin[1] + 30.0 * flatforward[1],
            self.pml.origin[2] + 4.0,
        ];
        if (self.world.point_contents(&spot) & CONTENTS_SOLID) == 0 {
            return;
        }
        spot[2] += 16.0;
        if self.world.point_contents(&spot) != 0 {
            return;
        }

        // jump out of water
        self.pml.velocity = vector_scale(&flatforward, 50.0);
        self.pml.velocity[2] = 350.0;
        self.pm.s.pm_flags.insert(PmFlags::TIME_WATERJUMP);
        self.pm.s.pm_time = 255;
    }

    // --------------------------------------------------------
    // Spectator fly
    // --------------------------------------------------------

    fn fly_move(&mut self) {
        self.pm.viewheight = 22.0;

        // friction
        let speed = vector_length(&self.pml.velocity);
        if speed < 1.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            let control = speed.max(self.pmp.stop_speed);
            let drop = control * self.pmp.friction * 1.5 * self.pml.frametime;
            let newspeed = (speed - drop).max(0.0) / speed;
            self.pml.velocity = vector_scale(&self.pml.velocity, newspeed);
        }

        // accelerate
        let fm = self.pm.cmd.forwardmove as f32;
        let sm = self.pm.cmd.sidemove as f32;

        vector_normalize(&mut self.pml.forward);
        vector_normalize(&mut self.pml.right);

        let mut wishvel = VEC3_ORIGIN;
        for i in 0..3 {
            wishvel[i] = self.pml.forward[i] * fm + self.pml.right[i] * sm;
        }
        wishvel[2] += self.pm.cmd.upmove as f32;

        let mut wishdir = wishvel;
        let mut wishspeed = vector_normalize(&mut wishdir);
        if wishspeed > self.pmp.max_speed {
            wishspeed = self.pmp.max_speed;
        }

        self.accelerate(&wishdir, wishspeed, self.pmp.accelerate);

        // spectators pass through everything
        for i in 0..3 {
            self.pml.origin[i] += self.pml.frametime * self.pml.velocity[i];
        }
    }

    // --------------------------------------------------------
    // Duck / dead
    // --------------------------------------------------------

    fn check_duck(&mut self) {
        self.pm.mins[0] = -16.0;
        self.pm.mins[1] = -16.0;
        self.pm.maxs[0] = 16.0;
        self.pm.maxs[1] = 16.0;

        if self.pm.s.pm_type == PmType::Gib {
            self.pm.mins[2] = 0.0;
            self.pm.maxs[2] = 16.0;
            self.pm.viewheight = 8.0;
            return;
        }

        self.pm.mins[2] = -24.0;

        if self.pm.s.pm_type == PmType::Dead {
            self.pm.s.pm_flags.insert(PmFlags::DUCKED);
        } else if self.pm.cmd.upmove < 0 && self.pm.s.pm_flags.contains(PmFlags::ON_GROUND) {
            self.pm.s.pm_flags.insert(PmFlags::DUCKED);
        } else if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            // stand up if there is room
            self.pm.maxs[2] = 32.0;
            let trace = self.trace(&self.pml.origin, &self.pml.origin);
            if !trace.allsolid {
                self.pm.s.pm_flags.remove(PmFlags::DUCKED);
            }
        }

        if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            self.pm.maxs[2] = 4.0;
            self.pm.viewheight = -2.0;
        } else {
            self.pm.maxs[2] = 32.0;
            self.pm.viewheight = 22.0;
        }
    }

    fn dead_move(&mut self) {
        if self.pm.groundentity < 0 {
            return;
        }

        // extra friction
        let speed = vector_length(&self.pml.velocity) - 20.0;
        if speed <= 0.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            vector_normalize(&mut self.pml.velocity);
            self.pml.velocity = vector_scale(&self.pml.velocity, speed);
        }
    }

    // --------------------------------------------------------
    // Fixed-point snapping
    // --------------------------------------------------------

    fn good_position(&self) -> bool {
        if self.pm.s.pm_type == PmType::Spectator {
            return true;
        }
        let origin = [
            self.pm.s.origin[0] as f32 * 0.125,
            self.pm.s.origin[1] as f32 * 0.125,
            self.pm.s.origin[2] as f32 * 0.125,
        ];
        !self.trace(&origin, &origin).allsolid
    }

    /// Round the float results into 12.3 fixed point, jittering toward
    /// the movement direction until the rounded position is out of
    /// solid.
    fn snap_position(&mut self) {
        // try all single bits first
        const JITTERBITS: [i32; 8] = [0, 4, 1, 2, 3, 5, 6, 7];

        for i in 0..3 {
            self.pm.s.velocity[i] = (self.pml.velocity[i] * 8.0) as i16;
        }

        let mut sign = [0i16; 3];
        for i in 0..3 {
            sign[i] = if self.pml.origin[i] >= 0.0 { 1 } else { -1 };
            self.pm.s.origin[i] = (self.pml.origin[i] * 8.0) as i16;
            if self.pm.s.origin[i] as f32 * 0.125 == self.pml.origin[i] {
                sign[i] = 0;
            }
        }
        let base = self.pm.s.origin;

        for bits in JITTERBITS {
            self.pm.s.origin = base;
            for i in 0..3 {
                if (bits & (1 << i)) != 0 {
                    self.pm.s.origin[i] = self.pm.s.origin[i].wrapping_add(sign[i]);
                }
            }
            if self.good_position() {
                return;
            }
        }

        // go back to the last position
        self.pm.s.origin = self.pml.previous_origin;
    }

    fn initial_snap_position(&mut self) {
        const OFFSET: [i16; 3] = [0, -1, 1];

        let base = self.pm.s.origin;
        for z in OFFSET {
            self.pm.s.origin[2] = base[2].wrapping_add(z);
            for y in OFFSET {
                self.pm.s.origin[1] = base[1].wrapping_add(y);
                for x in OFFSET {
                    self.pm.s.origin[0] = base[0].wrapping_add(x);
                    if self.good_position() {
                        for i in 0..3 {
                            self.pml.origin[i] = self.pm.s.origin[i] as f32 * 0.125;
                        }
                        self.pml.previous_origin = self.pm.s.origin;
                        return;
                    }
                }
            }
        }
    }

    // --------------------------------------------------------
    // View angles
    // --------------------------------------------------------

    fn clamp_angles(&mut self) {
        if self.pm.s.pm_flags.contains(PmFlags::TIME_TELEPORT) {
            self.pm.viewangles[YAW] =
                short2angle(self.pm.cmd.angles[YAW].wrapping_add(self.pm.s.delta_angles[YAW]));
            self.pm.viewangles[PITCH] = 0.0;
            self.pm.viewangles[2] = 0.0;
        } else {
            // circularly clamp the angles with deltas
            for i in 0..3 {
                let temp = self.pm.cmd.angles[i].wrapping_add(self.pm.s.delta_angles[i]);
                self.pm.viewangles[i] = short2angle(temp);
            }

            // don't let the player look up or down more than 90 degrees
            if self.pm.viewangles[PITCH] > 89.0 && self.pm.viewangles[PITCH] < 180.0 {
                self.pm.viewangles[PITCH] = 89.0;
            } else if self.pm.viewangles[PITCH] < 271.0 && self.pm.viewangles[PITCH] >= 180.0 {
                self.pm.viewangles[PITCH] = 271.0;
            }
        }

        angle_vectors(
            &self.pm.viewangles,
            Some(&mut self.pml.forward),
            Some(&mut self.pml.right),
            Some(&mut self.pml.up),
        );
    }

    // --------------------------------------------------------
    // One full movement step
    // --------------------------------------------------------

    fn execute(&mut self) {
        // clear results
        self.pm.numtouch = 0;
        self.pm.viewangles = VEC3_ORIGIN;
        self.pm.viewheight = 0.0;
        self.pm.groundentity = -1;
        self.pm.watertype = 0;
        self.pm.waterlevel = 0;

        self.pml = PmLocal::default();
        for i in 0..3 {
            self.pml.origin[i] = self.pm.s.origin[i] as f32 * 0.125;
            self.pml.velocity[i] = self.pm.s.velocity[i] as f32 * 0.125;
        }
        // save old origin in case we get stuck
        self.pml.previous_origin = self.pm.s.origin;
        self.pml.frametime = self.pm.cmd.msec as f32 * 0.001;

        self.clamp_angles();

        if self.pm.s.pm_type == PmType::Spectator {
            self.fly_move();
            self.snap_position();
            return;
        }

        if self.pm.s.pm_type as i32 >= PmType::Dead as i32 {
            self.pm.cmd.forwardmove = 0;
            self.pm.cmd.sidemove = 0;
            self.pm.cmd.upmove = 0;
        }

        if self.pm.s.pm_type == PmType::Freeze {
            return; // no movement at all
        }

        self.check_duck();

        if self.pm.snapinitial {
            self.initial_snap_position();
        }

        self.categorize_position();

        if self.pm.s.pm_type == PmType::Dead {
            self.dead_move();
        }

        self.check_water_jump();

        // drop timing counter
        if self.pm.s.pm_time != 0 {
            let msec = ((self.pm.cmd.msec >> 3) as i32).max(1);
            if msec >= self.pm.s.pm_time as i32 {
                self.pm.s.pm_flags.remove(
                    PmFlags::TIME_WATERJUMP | PmFlags::TIME_LAND | PmFlags::TIME_TELEPORT,
                );
                self.pm.s.pm_time = 0;
            } else {
                self.pm.s.pm_time -= msec as u8;
            }
        }

        if self.pm.s.pm_flags.contains(PmFlags::TIME_TELEPORT) {
            // teleport pause stays exactly in place
        } else if self.pm.s.pm_flags.contains(PmFlags::TIME_WATERJUMP) {
            // waterjump has no control, but falls
            self.pml.velocity[2] -= self.pm.s.gravity as f32 * self.pml.frametime;
            if self.pml.velocity[2] < 0.0 {
                // cancel as soon as we are falling down again
                self.pm.s.pm_flags.remove(
                    PmFlags::TIME_WATERJUMP | PmFlags::TIME_LAND | PmFlags::TIME_TELEPORT,
                );
                self.pm.s.pm_time = 0;
            }
            self.step_slide_move();
        } else {
            self.check_jump();
            self.friction();

            if self.pm.waterlevel >= 2 {
                self.water_move();
            } else {
                // underwater pitch aiming is full-range; on land it is damped
                let mut angles = self.pm.viewangles;
                if angles[PITCH] > 180.0 {
                    angles[PITCH] -= 360.0;
                }
                angles[PITCH] /= 3.0;

                angle_vectors(
                    &angles,
                    Some(&mut self.pml.forward),
                    Some(&mut self.pml.right),
                    Some(&mut self.pml.up),
                );

                self.air_move();
            }
        }

        self.categorize_position();
        self.snap_position();
    }
}

// ============================================================
// Public entry point
// ============================================================

/// Run one player movement step. Called by the server for each received
/// command and by the client to re-simulate unacknowledged commands.
pub fn pmove(pm: &mut PmoveData, params: &MoveParams, world: &impl WorldQuery) {
    let mut ctx = PmoveContext {
        pm,
        pmp: params,
        pml: PmLocal::default(),
        world,
    };
    ctx.execute();
}

// ============================================================
// Tests
// ============================================================
