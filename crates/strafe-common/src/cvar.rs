// cvar.rs — console variable store

use crate::cmd::{CmdSystem, VarView};
use crate::common::com_printf;
use crate::wildcards::wildcard_match;

use bitflags::bitflags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// written to the config file
        const ARCHIVE  = 1;
        /// cannot be changed from the console
        const NOSET    = 2;
        /// created by a user `set`, not by engine code
        const CUSTOM   = 4;
        /// transient; commands and macros may shadow the name
        const VOLATILE = 8;
        /// never substituted during expansion
        const PRIVATE  = 16;
    }
}

#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub value: f32,
    pub flags: CvarFlags,
    pub modified: bool,
}

/// Insertion-ordered variable store with a hash index. Owned by the
/// application; the interpreter reaches it through callbacks.
pub struct CvarContext {
    vars: Vec<Cvar>,
    index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.index.get(name).map(|&idx| &self.vars[idx])
    }

    pub fn exists(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Float value, 0 when missing.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    /// String value, "" when missing.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Get or create. An existing variable keeps its value and ORs in
    /// the flags.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.index.get(name) {
            self.vars[idx].flags |= flags;
            return idx;
        }
        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            value: value.parse().unwrap_or(0.0),
            flags,
            modified: true,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let Some(&idx) = self.index.get(name) else {
            return self.get(name, value, CvarFlags::empty());
        };

        let var = &mut self.vars[idx];
        if !force && var.flags.contains(CvarFlags::NOSET) {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }
        if value == var.string {
            return idx; // not changed
        }
        var.string = value.to_string();
        var.value = value.parse().unwrap_or(0.0);
        var.modified = true;
        idx
    }

    /// Set a value, respecting NOSET.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Set a value, ignoring NOSET.
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Set value and OR in flags, creating if needed.
    pub fn full_set(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        let idx = self.set2(name, value, false);
        self.vars[idx].flags |= flags;
        idx
    }

    // ========================================================
    // Command-line behavior
    // ========================================================

    /// Set/query via the command line: called by dispatch when token 0
    /// is a variable name. Returns false when it is not.
    pub fn command(&mut self, cmd: &CmdSystem) -> bool {
        let name = cmd.cmd_argv(0).to_string();
        if !self.exists(&name) {
            return false;
        }

        // perform a variable print or set
        if cmd.cmd_argc() == 1 {
            let var = self.find_var(&name).unwrap();
            com_printf(&format!("\"{}\" is \"{}\"\n", var.name, var.string));
            return true;
        }

        self.set(&name, cmd.cmd_argv(1));
        true
    }

    /// set <name> <value> [a] — user-created variables get CUSTOM, and
    /// ARCHIVE with the trailing a.
    pub fn set_f(&mut self, cmd: &CmdSystem) {
        let c = cmd.cmd_argc();
        if c != 3 && c != 4 {
            com_printf("usage: set <variable> <value> [a]\n");
            return;
        }

        if c == 4 {
            if cmd.cmd_argv(3) != "a" {
                com_printf("flags can only be 'a' (archive)\n");
                return;
            }
            self.full_set(
                cmd.cmd_argv(1),
                cmd.cmd_argv(2),
                CvarFlags::CUSTOM | CvarFlags::ARCHIVE,
            );
        } else {
            self.full_set(cmd.cmd_argv(1), cmd.cmd_argv(2), CvarFlags::CUSTOM);
        }
    }

    /// cvarlist [filter]
    pub fn list_f(&self, cmd: &CmdSystem) {
        let filter = if cmd.cmd_argc() > 1 {
            Some(cmd.cmd_argv(1))
        } else {
            None
        };
        let mut shown = 0;
        for var in &self.vars {
            if let Some(pat) = filter {
                if !wildcard_match(pat, &var.name) {
                    continue;
                }
            }
            let mut tags = String::new();
            tags.push(if var.flags.contains(CvarFlags::ARCHIVE) { 'A' } else { ' ' });
            tags.push(if var.flags.contains(CvarFlags::NOSET) { 'N' } else { ' ' });
            tags.push(if var.flags.contains(CvarFlags::CUSTOM) { 'C' } else { ' ' });
            com_printf(&format!("{} {} \"{}\"\n", tags, var.name, var.string));
            shown += 1;
        }
        com_printf(&format!("{} of {} cvars\n", shown, self.vars.len()));
    }

    /// Write ARCHIVE variables as set statements to a config sink.
    pub fn write_variables(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.vars {
            if var.flags.contains(CvarFlags::ARCHIVE) {
                writeln!(w, "set {} \"{}\" a", var.name, var.string)?;
            }
        }
        Ok(())
    }

    /// Prefix completion over variable names.
    pub fn complete_variable(&self, partial: &str) -> Option<&str> {
        if partial.is_empty() {
            return None;
        }
        self.vars
            .iter()
            .find(|v| v.name == partial)
            .or_else(|| self.vars.iter().find(|v| v.name.starts_with(partial)))
            .map(|v| v.name.as_str())
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Interpreter wiring
// ============================================================

/// Wire a shared variable store into an interpreter: expansion lookup,
/// the variable dispatch step, and the set/cvarlist commands.
pub fn attach_to_interp(cmd: &mut CmdSystem, cvars: &Arc<Mutex<CvarContext>>) {
    let store = cvars.clone();
    cmd.var_lookup = Some(Box::new(move |name| {
        let g = store.lock();
        g.find_var(name).map(|v| VarView {
            value: v.string.clone(),
            private: v.flags.contains(CvarFlags::PRIVATE),
            weak: v.flags.intersects(CvarFlags::CUSTOM | CvarFlags::VOLATILE),
        })
    }));

    let store = cvars.clone();
    cmd.var_command = Some(Box::new(move |ctx| store.lock().command(ctx)));

    let store = cvars.clone();
    cmd.cmd_add_command("set", Box::new(move |ctx| store.lock().set_f(ctx)));

    let store = cvars.clone();
    cmd.cmd_add_command("cvarlist", Box::new(move |ctx| store.lock().list_f(ctx)));
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_creates_then_keeps_value() {
        let mut cv = CvarContext::new();
        cv.get("fov", "90", CvarFlags::ARCHIVE);
        assert_eq!(cv.variable_value("fov"), 90.0);
        // a second get keeps the value but accumulates flags
        cv.get("fov", "110", CvarFlags::NOSET);
        assert_eq!(cv.variable_string("fov"), "90");
        assert!(cv.find_var("fov").unwrap().flags.contains(CvarFlags::NOSET));
    }

    #[test]
    fn test_set_respects_noset() {
        let mut cv = CvarContext::new();
        cv.get("maxclients", "8", CvarFlags::NOSET);
        cv.set("maxclients", "32");
        assert_eq!(cv.variable_string("maxclients"), "8");
        cv.force_set("maxclients", "32");
        assert_eq!(cv.variable_string("maxclients"), "32");
    }

    #[test]
    fn test_set_creates_missing_variable() {
        let mut cv = CvarContext::new();
        cv.set("newvar", "1.5");
        assert_eq!(cv.variable_value("newvar"), 1.5);
    }

    #[test]
    fn test_non_numeric_value_is_zero() {
        let mut cv = CvarContext::new();
        cv.set("skin", "male/grunt");
        assert_eq!(cv.variable_value("skin"), 0.0);
        assert_eq!(cv.variable_string("skin"), "male/grunt");
    }

    #[test]
    fn test_write_variables_archives_only() {
        let mut cv = CvarContext::new();
        cv.get("fov", "90", CvarFlags::ARCHIVE);
        cv.get("developer", "1", CvarFlags::empty());
        let mut out = Vec::new();
        cv.write_variables(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("set fov \"90\" a"));
        assert!(!text.contains("developer"));
    }

    #[test]
    fn test_complete_variable() {
        let mut cv = CvarContext::new();
        cv.get("cl_predict", "1", CvarFlags::empty());
        cv.get("cl_showmiss", "0", CvarFlags::empty());
        assert_eq!(cv.complete_variable("cl_p"), Some("cl_predict"));
        assert_eq!(cv.complete_variable("cl_predict"), Some("cl_predict"));
        assert_eq!(cv.complete_variable("sv_"), None);
    }

    // -------------------------------------------------------
    // Interpreter integration
    // -------------------------------------------------------

    fn wired() -> (CmdSystem, Arc<Mutex<CvarContext>>) {
        let mut cmd = CmdSystem::new();
        cmd.cmd_init();
        let cvars = Arc::new(Mutex::new(CvarContext::new()));
        attach_to_interp(&mut cmd, &cvars);
        (cmd, cvars)
    }

    #[test]
    fn test_set_command_creates_custom_variable() {
        let (mut cmd, cvars) = wired();
        cmd.cmd_execute_string("set sensitivity 4");
        let g = cvars.lock();
        assert_eq!(g.variable_value("sensitivity"), 4.0);
        assert!(g.find_var("sensitivity").unwrap().flags.contains(CvarFlags::CUSTOM));
    }

    #[test]
    fn test_bare_name_sets_via_dispatch() {
        let (mut cmd, cvars) = wired();
        cvars.lock().get("hand", "0", CvarFlags::empty());
        cmd.cmd_execute_string("hand 2");
        assert_eq!(cvars.lock().variable_string("hand"), "2");
    }

    #[test]
    fn test_expansion_sees_variable_values() {
        let (mut cmd, cvars) = wired();
        cvars.lock().get("name", "grunt", CvarFlags::empty());
        let out = cmd
            .cmd_expand_string("say hello $name", crate::cmd::ExpandMode::Normal)
            .unwrap();
        assert_eq!(out, "say hello grunt");
    }

    #[test]
    fn test_private_variable_not_expanded() {
        let (mut cmd, cvars) = wired();
        cvars.lock().get("rcon_password", "sekrit", CvarFlags::PRIVATE);
        let out = cmd
            .cmd_expand_string("say $rcon_password", crate::cmd::ExpandMode::Normal)
            .unwrap();
        assert_eq!(out, "say ");
    }

    #[test]
    fn test_engine_variable_blocks_command_registration() {
        let (mut cmd, cvars) = wired();
        cvars.lock().get("timescale", "1", CvarFlags::empty());
        cmd.cmd_add_command("timescale", Box::new(|_| {}));
        assert!(!cmd.cmd_exists("timescale"));
    }

    #[test]
    fn test_custom_variable_does_not_block_registration() {
        let (mut cmd, _cvars) = wired();
        cmd.cmd_execute_string("set userthing 1");
        cmd.cmd_add_command("userthing", Box::new(|_| {}));
        assert!(cmd.cmd_exists("userthing"));
    }

    #[test]
    fn test_archive_flag_via_set_a() {
        let (mut cmd, cvars) = wired();
        cmd.cmd_execute_string("set crosshair 3 a");
        let g = cvars.lock();
        let var = g.find_var("crosshair").unwrap();
        assert!(var.flags.contains(CvarFlags::ARCHIVE));
        assert!(var.flags.contains(CvarFlags::CUSTOM));
    }
}
