// strafe-common — engine systems shared by client and server:
// script command processing, console variables, player movement.

pub mod cmd;
pub mod common;
pub mod cvar;
pub mod pmove;
pub mod shared;
pub mod wildcards;
