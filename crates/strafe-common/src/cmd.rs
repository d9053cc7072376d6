// cmd.rs — script command processing: buffer, tokenizer, expansion, dispatch

use crate::common::{com_printf, com_wprintf};
use crate::shared::{MAX_ALIAS_NAME, MAX_STRING_CHARS, MAX_STRING_TOKENS};
use crate::wildcards::wildcard_match;

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Default command buffer capacity in bytes.
pub const CMD_BUFFER_SIZE: usize = 65536;
/// Alias dispatches allowed per buffer drain before the loop guard trips.
pub const ALIAS_LOOP_COUNT: u32 = 16;
/// Substitutions allowed in one expansion before the loop guard trips.
pub const EXPANSION_LOOP_COUNT: u32 = 100;

// ============================================================
// Failure taxonomy for the expander
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("line exceeded {limit} chars")]
    TooLong { limit: usize },
    #[error("line has unmatched quote")]
    UnmatchedQuote,
    #[error("macro expansion loop")]
    ExpansionLoop,
}

/// When to run text handed to cbuf_execute_text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecWhen {
    /// Bypass the buffer and dispatch immediately.
    Now,
    /// Prepend, so the text runs before anything already queued.
    Insert,
    /// Append at the logical end.
    Append,
}

/// Expansion mode. AliasArgs resolves only positional parameters so that
/// unrelated `$` text inside alias bodies survives verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    Normal,
    AliasArgs,
}

// ============================================================
// Handler and collaborator callback types
// ============================================================

pub type CmdFn = Box<dyn Fn(&mut CmdSystem) + Send>;
pub type CompleterFn = Box<dyn Fn(&str) -> Vec<String> + Send>;
pub type MacroFn = Box<dyn Fn() -> String + Send>;

/// How the interpreter sees a console variable during expansion and
/// registration checks.
pub struct VarView {
    pub value: String,
    /// Suppresses expansion of the variable's value.
    pub private: bool,
    /// User-created or volatile; such a name may be shadowed by a
    /// command or macro registration.
    pub weak: bool,
}

pub type VarLookupFn = Box<dyn Fn(&str) -> Option<VarView> + Send>;
/// Set/query via command line. Returns true when token 0 named a variable.
pub type VarCommandFn = Box<dyn Fn(&mut CmdSystem) -> bool + Send>;
/// Forward the current line to the remote peer; false when not connected.
pub type ForwardFn = Box<dyn Fn(&CmdSystem) -> bool + Send>;
/// Script file loader for `exec`.
pub type FsLoadFn = Box<dyn Fn(&str) -> Option<Vec<u8>> + Send>;

// ============================================================
// Registry records
// ============================================================

pub struct CmdAlias {
    pub name: String,
    pub value: String,
}

pub struct CmdEntry {
    pub name: String,
    /// None marks a completion placeholder; dispatch forwards it.
    pub handler: Option<CmdFn>,
    pub completer: Option<CompleterFn>,
}

pub struct CmdMacro {
    pub name: String,
    pub format: MacroFn,
}

/// Option table entry for the handler-side option walker. A ':' after
/// the short character marks a required argument; the rest of the short
/// string names it for help output (e.g. "f:filename").
pub struct CmdOption {
    pub sh: &'static str,
    pub lo: &'static str,
    pub help: &'static str,
}

// ============================================================
// Command buffer
// ============================================================

/// Bounded text queue of pending statements. Front removal and prepend
/// are deque operations; statement boundaries are found at flush time by
/// scanning the whole remaining buffer with quote parity, because text
/// prepended later can change where an earlier boundary falls.
pub struct CmdBuf {
    text: VecDeque<u8>,
    capacity: usize,
    /// Frames to suspend before continuing execution. Decremented by the
    /// external per-frame driver, never by the flush itself.
    pub wait_count: u32,
    /// Alias dispatches since the last full drain.
    pub alias_count: u32,
}

impl CmdBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: VecDeque::with_capacity(capacity),
            capacity,
            wait_count: 0,
            alias_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================
// The interpreter context
// ============================================================

/// Owns the command buffer, the tokenized line, and the command, alias,
/// and macro registries. The variable store and the remote peer are
/// external collaborators reached through callbacks.
pub struct CmdSystem {
    pub buf: CmdBuf,

    // current tokenized line
    argv: Vec<String>,
    offsets: Vec<usize>,
    line: String,

    // option walker state
    optind: usize,
    optarg: String,
    optopt: String,

    aliases: Vec<CmdAlias>,
    alias_index: HashMap<String, usize>,

    macros: Vec<CmdMacro>,
    macro_index: HashMap<String, usize>,

    commands: Vec<CmdEntry>,
    command_index: HashMap<String, usize>,

    pub var_lookup: Option<VarLookupFn>,
    pub var_command: Option<VarCommandFn>,
    pub forward_to_remote: Option<ForwardFn>,
    pub fs_load: Option<FsLoadFn>,
}

impl CmdSystem {
    pub fn new() -> Self {
        Self::with_capacity(CMD_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: CmdBuf::new(capacity),
            argv: Vec::new(),
            offsets: Vec::new(),
            line: String::new(),
            optind: 1,
            optarg: String::new(),
            optopt: String::new(),
            aliases: Vec::new(),
            alias_index: HashMap::new(),
            macros: Vec::new(),
            macro_index: HashMap::new(),
            commands: Vec::new(),
            command_index: HashMap::new(),
            var_lookup: None,
            var_command: None,
            forward_to_remote: None,
            fs_load: None,
        }
    }

    // ========================================================
    // Command buffer operations
    // ========================================================

    /// Add command text at the end of the buffer. Rejected whole on
    /// overflow, never partially applied.
    pub fn cbuf_add_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if self.buf.text.len() + bytes.len() > self.buf.capacity {
            com_wprintf("Cbuf_AddText: overflow\n");
            return;
        }
        self.buf.text.extend(bytes.iter().copied());
    }

    /// Add command text at the beginning of the buffer, followed by an
    /// injected newline, so script-inserted content (exec, alias bodies)
    /// runs before anything already queued.
    pub fn cbuf_insert_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            return;
        }
        if self.buf.text.len() + bytes.len() + 1 > self.buf.capacity {
            com_wprintf("Cbuf_InsertText: overflow\n");
            return;
        }
        self.buf.text.push_front(b'\n');
        for &b in bytes.iter().rev() {
            self.buf.text.push_front(b);
        }
    }

    pub fn cbuf_execute_text(&mut self, when: ExecWhen, text: &str) {
        match when {
            ExecWhen::Now => self.cmd_execute_string(text),
            ExecWhen::Insert => self.cbuf_insert_text(text),
            ExecWhen::Append => self.cbuf_add_text(text),
        }
    }

    /// Flush the buffer: extract and dispatch statements until it is
    /// empty or a wait is pending. A statement's execution may prepend
    /// more text, which is why extraction removes from the front before
    /// dispatching.
    pub fn cbuf_execute(&mut self) {
        loop {
            if self.buf.text.is_empty() {
                // full drain resets the alias loop guard
                self.buf.alias_count = 0;
                return;
            }
            if self.buf.wait_count > 0 {
                // leave remaining text for a later frame
                return;
            }

            // find an unquoted ; or \n, whichever comes first
            let mut quotes = 0u32;
            let mut brk = self.buf.text.len();
            for (i, &b) in self.buf.text.iter().enumerate() {
                if b == b'"' {
                    quotes += 1;
                }
                if (quotes & 1) == 0 && b == b';' {
                    brk = i;
                    break;
                }
                if b == b'\n' {
                    brk = i;
                    break;
                }
            }

            let mut line_bytes: Vec<u8> = self.buf.text.drain(..brk).collect();
            if !self.buf.text.is_empty() {
                self.buf.text.pop_front(); // the delimiter
            }
            // over-long statements are truncated, not an error
            line_bytes.truncate(MAX_STRING_CHARS - 1);
            let line = String::from_utf8_lossy(&line_bytes).into_owned();

            self.cmd_execute_string(&line);
        }
    }

    /// Per-frame driver: pays down one frame of a pending wait, then
    /// flushes.
    pub fn cbuf_frame(&mut self) {
        if self.buf.wait_count > 0 {
            self.buf.wait_count -= 1;
        }
        self.cbuf_execute();
    }

    // ========================================================
    // Tokenized line accessors
    // ========================================================

    pub fn cmd_argc(&self) -> usize {
        self.argv.len()
    }

    /// Argument by index; empty string out of range.
    pub fn cmd_argv(&self, arg: usize) -> &str {
        self.argv.get(arg).map(String::as_str).unwrap_or("")
    }

    /// argv 1.. joined by single spaces.
    pub fn cmd_args(&self) -> String {
        self.cmd_args_from(1)
    }

    pub fn cmd_args_from(&self, from: usize) -> String {
        if from >= self.argv.len() {
            return String::new();
        }
        self.argv[from..].join(" ")
    }

    /// Untouched source text from token 1 onward.
    pub fn cmd_raw_args(&self) -> &str {
        self.cmd_raw_args_from(1)
    }

    pub fn cmd_raw_args_from(&self, from: usize) -> &str {
        if from >= self.argv.len() {
            return "";
        }
        &self.line[self.offsets[from]..]
    }

    pub fn cmd_raw_string(&self) -> &str {
        &self.line
    }

    pub fn cmd_arg_offset(&self, arg: usize) -> usize {
        if arg >= self.argv.len() {
            return self.line.len();
        }
        self.offsets[arg]
    }

    /// Index of the token containing (or preceding) a byte offset.
    pub fn cmd_find_arg_for_offset(&self, offset: usize) -> usize {
        let mut i = 1;
        while i < self.argv.len() {
            if offset < self.offsets[i] {
                break;
            }
            i += 1;
        }
        i - 1
    }

    // ========================================================
    // Macro/variable expansion
    // ========================================================

    /// Expand `$name`, `${name}`, `${$name}`, `$$`, `$qt`, `$sc` (and in
    /// alias mode `$0`..`$9`, `$@`) in `text`. The input is not mutated.
    pub fn cmd_expand_string(&self, text: &str, mode: ExpandMode) -> Result<String, ExpandError> {
        if text.len() >= MAX_STRING_CHARS {
            return Err(ExpandError::TooLong {
                limit: MAX_STRING_CHARS,
            });
        }

        let mut scan: Vec<u8> = text.as_bytes().to_vec();
        let mut i = 0usize;
        let mut inquote = false;
        let mut count = 0u32;

        while i < scan.len() {
            let c = scan[i];
            if c == b'"' {
                inquote = !inquote;
            }
            if inquote || c != b'$' {
                i += 1;
                continue;
            }

            let mut start = i + 1;
            if start >= scan.len() {
                break; // trailing '$'
            }

            // $$ escapes a literal $
            if scan[start] == b'$' {
                scan.remove(i);
                i += 1; // the kept '$' is not re-examined
                continue;
            }

            // whitespace between $ and the name is skipped
            while start < scan.len() && scan[start] <= b' ' {
                start += 1;
            }

            // scan out the complete name
            let mut name: Vec<u8> = Vec::new();
            let mut indirect = false;
            let mut end = start;
            if end < scan.len() && scan[end] == b'{' {
                end += 1;
                if end < scan.len() && scan[end] == b'$' {
                    // ${$name}: the value is itself a name for the re-scan
                    indirect = true;
                    end += 1;
                }
                while end < scan.len() {
                    if scan[end] == b'}' {
                        end += 1;
                        break;
                    }
                    name.push(scan[end]);
                    end += 1;
                }
            } else {
                while end < scan.len() && scan[end] > b' ' {
                    name.push(scan[end]);
                    end += 1;
                }
            }

            if name.is_empty() {
                i += 1;
                continue;
            }
            let name = String::from_utf8_lossy(&name).into_owned();

            let mut rescan = false;
            let mut replacement: String;

            match mode {
                ExpandMode::AliasArgs => {
                    // positional parameters only; anything else is left
                    // untouched so unrelated $ text in alias bodies survives
                    if name.len() > 1 {
                        i += 1;
                        continue;
                    }
                    let ch = name.as_bytes()[0];
                    if ch.is_ascii_digit() {
                        replacement = self.cmd_argv((ch - b'0') as usize).to_string();
                    } else if ch == b'@' {
                        replacement = self.cmd_args();
                    } else {
                        i += 1;
                        continue;
                    }
                }
                ExpandMode::Normal => {
                    let key = name.to_ascii_lowercase();
                    if let Some(&idx) = self.macro_index.get(&key) {
                        replacement = (self.macros[idx].format)();
                    } else {
                        let var = self.var_lookup.as_ref().and_then(|f| f(&name));
                        match var {
                            Some(v) if !v.private => {
                                // variable values may contain further $
                                // references; mark for re-scan
                                replacement = v.value;
                                rescan = true;
                            }
                            _ => {
                                replacement = match name.as_str() {
                                    "qt" => "\"".to_string(),
                                    "sc" => ";".to_string(),
                                    _ => String::new(),
                                };
                            }
                        }
                    }
                }
            }

            if indirect && !replacement.is_empty() {
                replacement.insert(0, '$');
                rescan = true;
            }

            let new_len = i + replacement.len() + (scan.len() - end);
            if new_len >= MAX_STRING_CHARS {
                return Err(ExpandError::TooLong {
                    limit: MAX_STRING_CHARS,
                });
            }

            let mut next: Vec<u8> = Vec::with_capacity(new_len);
            next.extend_from_slice(&scan[..i]);
            next.extend_from_slice(replacement.as_bytes());
            next.extend_from_slice(&scan[end..]);
            scan = next;

            if !rescan {
                // skip over the substituted text; its quotes do not
                // toggle the scan parity (this is what makes a lone $qt
                // usable)
                i += replacement.len();
            }

            count += 1;
            if count == EXPANSION_LOOP_COUNT {
                return Err(ExpandError::ExpansionLoop);
            }
        }

        if inquote {
            return Err(ExpandError::UnmatchedQuote);
        }

        Ok(String::from_utf8_lossy(&scan).into_owned())
    }

    // ========================================================
    // Tokenizer
    // ========================================================

    /// Parse `text` into command line tokens, retaining the source line
    /// and per-token byte offsets. `$` references are expanded first
    /// unless `expand` is false.
    pub fn cmd_tokenize_string(&mut self, text: &str, expand: bool) {
        self.argv.clear();
        self.offsets.clear();
        self.line.clear();
        self.optind = 1;
        self.optarg.clear();
        self.optopt.clear();

        if text.is_empty() {
            return;
        }

        let expanded;
        let text = if expand {
            match self.cmd_expand_string(text, ExpandMode::Normal) {
                Ok(s) => {
                    expanded = s;
                    expanded.as_str()
                }
                Err(err) => {
                    com_printf(&format!("{}, discarded.\n", err));
                    return;
                }
            }
        } else {
            text
        };

        let src = text.as_bytes();
        let src = &src[..src.len().min(MAX_STRING_CHARS - 1)];
        self.line = String::from_utf8_lossy(src).into_owned();

        let bytes = self.line.as_bytes();
        let mut pos = 0usize;

        while self.argv.len() < MAX_STRING_TOKENS {
            // skip whitespace up to a \n
            while pos < bytes.len() && bytes[pos] <= b' ' {
                if bytes[pos] == b'\n' {
                    return; // newlines separate buffered commands
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                return;
            }

            let tok_offset = pos;

            // statement separator as a standalone token (defensive parity
            // with the buffer-level splitter)
            if bytes[pos] == b';' {
                pos += 1;
                self.offsets.push(tok_offset);
                self.argv.push(";".to_string());
                continue;
            }

            // quoted token, verbatim up to the closing quote
            if bytes[pos] == b'"' {
                pos += 1;
                let body = pos;
                while pos < bytes.len() && bytes[pos] != b'"' {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return; // unterminated: drop it, keep earlier tokens
                }
                self.offsets.push(tok_offset);
                self.argv
                    .push(String::from_utf8_lossy(&bytes[body..pos]).into_owned());
                pos += 1;
                continue;
            }

            // regular token
            let body = pos;
            while pos < bytes.len() && bytes[pos] > b' ' && bytes[pos] != b'"' && bytes[pos] != b';'
            {
                pos += 1;
            }
            self.offsets.push(tok_offset);
            self.argv
                .push(String::from_utf8_lossy(&bytes[body..pos]).into_owned());
        }
        // token cap reached; excess text is silently dropped
    }

    // ========================================================
    // Registration
    // ========================================================

    fn var_shadows(&self, name: &str) -> bool {
        self.var_lookup
            .as_ref()
            .and_then(|f| f(name))
            .is_some_and(|v| !v.weak)
    }

    /// Register a command. A placeholder of the same name is upgraded in
    /// place; collisions are logged and refused, never fatal.
    pub fn cmd_register(
        &mut self,
        name: &str,
        handler: Option<CmdFn>,
        completer: Option<CompleterFn>,
    ) {
        if self.var_shadows(name) {
            com_wprintf(&format!(
                "Cmd_Register: {} already defined as a variable\n",
                name
            ));
            return;
        }

        let key = name.to_ascii_lowercase();
        if let Some(&idx) = self.command_index.get(&key) {
            if self.commands[idx].handler.is_some() {
                com_wprintf(&format!("Cmd_Register: {} already defined\n", name));
                return;
            }
            self.commands[idx].handler = handler;
            self.commands[idx].completer = completer;
            return;
        }

        let idx = self.commands.len();
        self.commands.push(CmdEntry {
            name: name.to_string(),
            handler,
            completer,
        });
        self.command_index.insert(key, idx);
    }

    pub fn cmd_add_command(&mut self, name: &str, handler: CmdFn) {
        self.cmd_register(name, Some(handler), None);
    }

    pub fn cmd_remove_command(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        let Some(idx) = self.command_index.remove(&key) else {
            com_printf(&format!("Cmd_RemoveCommand: {} not added\n", name));
            return;
        };
        self.commands.remove(idx);
        for v in self.command_index.values_mut() {
            if *v > idx {
                *v -= 1;
            }
        }
    }

    pub fn cmd_register_list(&mut self, cmds: Vec<(&str, CmdFn)>) {
        for (name, handler) in cmds {
            self.cmd_add_command(name, handler);
        }
    }

    pub fn cmd_deregister_list(&mut self, names: &[&str]) {
        for name in names {
            self.cmd_remove_command(name);
        }
    }

    pub fn cmd_exists(&self, name: &str) -> bool {
        self.command_index.contains_key(&name.to_ascii_lowercase())
    }

    /// Distinguishes placeholders (Some with no handler) from not found
    /// (None).
    pub fn cmd_find(&self, name: &str) -> Option<&CmdEntry> {
        self.command_index
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.commands[idx])
    }

    /// Register a completion placeholder: a known name with no handler.
    pub fn cmd_add_placeholder(&mut self, name: &str) {
        if self
            .var_lookup
            .as_ref()
            .and_then(|f| f(name))
            .is_some()
        {
            com_printf(&format!("{} is already defined as a variable\n", name));
            return;
        }
        let key = name.to_ascii_lowercase();
        if self.command_index.contains_key(&key) {
            return;
        }
        let idx = self.commands.len();
        self.commands.push(CmdEntry {
            name: name.to_string(),
            handler: None,
            completer: None,
        });
        self.command_index.insert(key, idx);
    }

    /// Register a macro: a read-only formatted value resolved during
    /// expansion. No removal operation exists.
    pub fn cmd_add_macro(&mut self, name: &str, format: MacroFn) {
        if self.var_shadows(name) {
            com_wprintf(&format!(
                "Cmd_AddMacro: {} already defined as a variable\n",
                name
            ));
            return;
        }
        let key = name.to_ascii_lowercase();
        if self.macro_index.contains_key(&key) {
            com_wprintf(&format!("Cmd_AddMacro: {} already defined\n", name));
            return;
        }
        let idx = self.macros.len();
        self.macros.push(CmdMacro {
            name: name.to_string(),
            format,
        });
        self.macro_index.insert(key, idx);
    }

    pub fn macro_exists(&self, name: &str) -> bool {
        self.macro_index.contains_key(&name.to_ascii_lowercase())
    }

    // ========================================================
    // Aliases
    // ========================================================

    /// Create or atomically replace an alias.
    pub fn alias_set(&mut self, name: &str, value: &str) {
        if name.len() >= MAX_ALIAS_NAME {
            com_printf("Alias name is too long\n");
            return;
        }
        let key = name.to_ascii_lowercase();
        if let Some(&idx) = self.alias_index.get(&key) {
            self.aliases[idx].value = value.to_string();
            return;
        }
        let idx = self.aliases.len();
        self.aliases.push(CmdAlias {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.alias_index.insert(key, idx);
    }

    pub fn alias_find(&self, name: &str) -> Option<&CmdAlias> {
        self.alias_index
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.aliases[idx])
    }

    pub fn alias_remove(&mut self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        let Some(idx) = self.alias_index.remove(&key) else {
            return false;
        };
        self.aliases.remove(idx);
        for v in self.alias_index.values_mut() {
            if *v > idx {
                *v -= 1;
            }
        }
        true
    }

    pub fn alias_remove_all(&mut self) {
        self.aliases.clear();
        self.alias_index.clear();
    }

    /// Write alias definitions to a config sink.
    pub fn cmd_write_aliases(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        for a in &self.aliases {
            writeln!(w, "alias \"{}\" \"{}\"", a.name, a.value)?;
        }
        Ok(())
    }

    // ========================================================
    // Completion enumeration
    // ========================================================

    /// Exact match first, then the first prefix match, over commands and
    /// aliases.
    pub fn complete_command(&self, partial: &str) -> Option<&str> {
        if partial.is_empty() {
            return None;
        }
        for c in &self.commands {
            if c.name == partial {
                return Some(&c.name);
            }
        }
        for a in &self.aliases {
            if a.name == partial {
                return Some(&a.name);
            }
        }
        for c in &self.commands {
            if c.name.starts_with(partial) {
                return Some(&c.name);
            }
        }
        for a in &self.aliases {
            if a.name.starts_with(partial) {
                return Some(&a.name);
            }
        }
        None
    }

    pub fn complete_all_commands(&self, partial: &str) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|c| c.name.starts_with(partial))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn complete_all_aliases(&self, partial: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|a| a.name.starts_with(partial))
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn complete_all_macros(&self, partial: &str) -> Vec<&str> {
        self.macros
            .iter()
            .filter(|m| m.name.starts_with(partial))
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Invoke a command's completion helper for an argument position.
    pub fn complete_argument(&self, command: &str, partial: &str) -> Vec<String> {
        match self.cmd_find(command).and_then(|c| c.completer.as_ref()) {
            Some(completer) => completer(partial),
            None => Vec::new(),
        }
    }

    // ========================================================
    // Option walker
    // ========================================================

    /// Step over the tokenized line's options. Returns the matched short
    /// character, Some('?') for an unknown option, Some(':') for a
    /// missing argument, or None when the options are exhausted (the
    /// first non-option argument, if any, is left in optarg).
    pub fn cmd_parse_options(&mut self, options: &[CmdOption]) -> Option<char> {
        self.optopt.clear();

        if self.optind >= self.argv.len() {
            self.optarg.clear();
            return None;
        }

        let s = self.argv[self.optind].clone();
        if !s.starts_with('-') {
            self.optarg = s;
            return None;
        }
        self.optopt = s.clone();

        let found: Option<usize>;
        let mut value: Option<String> = None;

        if let Some(rest) = s.strip_prefix("--") {
            if rest.is_empty() {
                // special terminator
                self.optind += 1;
                self.optarg = self.argv.get(self.optind).cloned().unwrap_or_default();
                return None;
            }
            let (lo, attached) = match rest.split_once('=') {
                Some((l, v)) => (l, Some(v.to_string())),
                None => (rest, None),
            };
            found = options.iter().position(|o| o.lo == lo);
            if let Some(idx) = found {
                if attached.is_some() && !option_takes_arg(&options[idx]) {
                    com_printf(&format!("{} does not take an argument.\n", options[idx].lo));
                    self.cmd_print_hint();
                } else {
                    value = attached;
                }
            }
        } else {
            let rest = &s.as_bytes()[1..];
            found = if rest.len() == 1 {
                options.iter().position(|o| o.sh.as_bytes()[0] == rest[0])
            } else {
                None
            };
        }

        let Some(idx) = found else {
            com_printf(&format!("Unknown option: {}.\n", s));
            self.cmd_print_hint();
            return Some('?');
        };

        if value.is_none() && option_takes_arg(&options[idx]) {
            if self.optind + 1 >= self.argv.len() {
                com_printf(&format!("Missing argument to {}.\n", s));
                self.cmd_print_hint();
                return Some(':');
            }
            self.optind += 1;
            value = Some(self.argv[self.optind].clone());
        }

        self.optarg = value.unwrap_or_default();
        self.optind += 1;
        Some(options[idx].sh.as_bytes()[0] as char)
    }

    pub fn cmd_optarg(&self) -> &str {
        &self.optarg
    }

    pub fn cmd_optind(&self) -> usize {
        self.optind
    }

    pub fn cmd_print_usage(&self, options: &[CmdOption], suffix: Option<&str>) {
        let mut short = String::new();
        for o in options {
            short.push(o.sh.as_bytes()[0] as char);
            if option_takes_arg(o) {
                short.push(':');
            }
        }
        match suffix {
            Some(s) => com_printf(&format!("Usage: {} [-{}] {}\n", self.cmd_argv(0), short, s)),
            None => com_printf(&format!("Usage: {} [-{}]\n", self.cmd_argv(0), short)),
        }
    }

    pub fn cmd_print_help(&self, options: &[CmdOption]) {
        com_printf("\nAvailable options:\n");
        for o in options {
            let long = if option_takes_arg(o) {
                format!("{}=<{}>", o.lo, &o.sh[2..])
            } else {
                o.lo.to_string()
            };
            com_printf(&format!(
                "-{} | --{:<16.16} | {}\n",
                o.sh.as_bytes()[0] as char,
                long,
                o.help
            ));
        }
        com_printf("\n");
    }

    pub fn cmd_print_hint(&self) {
        com_printf(&format!(
            "Try '{} --help' for more information.\n",
            self.cmd_argv(0)
        ));
    }

    // ========================================================
    // Dispatch
    // ========================================================

    fn forward_line(&mut self) -> bool {
        let Some(f) = self.forward_to_remote.take() else {
            return false;
        };
        let ok = f(self);
        self.forward_to_remote = Some(f);
        ok
    }

    /// Dispatch one complete command line: commands, then aliases, then
    /// variables, then remote forwarding.
    pub fn cmd_execute_string(&mut self, text: &str) {
        self.cmd_tokenize_string(text, true);

        if self.argv.is_empty() {
            return;
        }

        let key = self.argv[0].to_ascii_lowercase();

        // check commands
        if let Some(&idx) = self.command_index.get(&key) {
            if self.commands[idx].handler.is_some() {
                let handler = self.commands[idx].handler.take().unwrap();
                handler(self);
                // the handler may have re-registered things; restore by name
                if let Some(&idx) = self.command_index.get(&key) {
                    if self.commands[idx].handler.is_none() {
                        self.commands[idx].handler = Some(handler);
                    }
                }
            } else if !self.forward_line() {
                com_printf(&format!("Can't \"{}\", not connected\n", self.cmd_argv(0)));
            }
            return;
        }

        // check aliases
        if let Some(&idx) = self.alias_index.get(&key) {
            if self.buf.alias_count >= ALIAS_LOOP_COUNT {
                com_wprintf("Runaway alias loop\n");
                return;
            }
            let value = self.aliases[idx].value.clone();
            match self.cmd_expand_string(&value, ExpandMode::AliasArgs) {
                Ok(expanded) => {
                    self.buf.alias_count += 1;
                    // nested alias content executes before sibling queued text
                    self.cbuf_insert_text(&expanded);
                }
                Err(err) => com_printf(&format!("{}, discarded.\n", err)),
            }
            return;
        }

        // check variables
        if let Some(vc) = self.var_command.take() {
            let handled = vc(self);
            self.var_command = Some(vc);
            if handled {
                return;
            }
        }

        // send it as a remote command if we are connected
        if !self.forward_line() {
            com_printf(&format!("Unknown command \"{}\"\n", self.cmd_argv(0)));
        }
    }

    // ========================================================
    // Builtin command handlers
    // ========================================================

    /// wait [n] — suspend buffer execution for n frames (default 1).
    fn wait_f(&mut self) {
        self.buf.wait_count = if self.cmd_argc() > 1 {
            self.cmd_argv(1).parse().unwrap_or(0)
        } else {
            1
        };
    }

    /// echo — print the rest of the line.
    fn echo_f(&self) {
        com_printf(&format!("{}\n", self.cmd_raw_args()));
    }

    /// exec <filename> — insert a script file's contents so it runs
    /// before anything already queued.
    fn exec_f(&mut self) {
        if self.cmd_argc() != 2 {
            com_printf(&format!(
                "{} <filename> : execute a script file\n",
                self.cmd_argv(0)
            ));
            return;
        }

        let mut filename = self.cmd_argv(1).to_string();
        let Some(load) = self.fs_load.as_ref() else {
            com_printf(&format!("Couldn't exec {}\n", filename));
            return;
        };

        let mut data = load(&filename);
        if data.is_none() && !filename.ends_with(".cfg") {
            filename.push_str(".cfg");
            data = load(&filename);
        }
        let Some(data) = data else {
            com_printf(&format!("Couldn't exec {}\n", filename));
            return;
        };

        com_printf(&format!("Execing {}\n", filename));
        let text = String::from_utf8_lossy(&data).into_owned();
        self.cbuf_insert_text(&text);
    }

    /// alias [name [body...]] — list, query, or define.
    fn alias_f(&mut self) {
        if self.cmd_argc() < 2 {
            if self.aliases.is_empty() {
                com_printf("No alias commands registered.\n");
                return;
            }
            com_printf("Registered alias commands:\n");
            for a in &self.aliases {
                com_printf(&format!("\"{}\" = \"{}\"\n", a.name, a.value));
            }
            return;
        }

        let name = self.cmd_argv(1).to_string();
        if self.cmd_exists(&name) {
            com_printf(&format!("\"{}\" already defined as a command\n", name));
            return;
        }
        if self
            .var_lookup
            .as_ref()
            .and_then(|f| f(&name))
            .is_some()
        {
            com_printf(&format!("\"{}\" already defined as a variable\n", name));
            return;
        }

        if self.cmd_argc() < 3 {
            match self.alias_find(&name) {
                Some(a) => com_printf(&format!("\"{}\" = \"{}\"\n", a.name, a.value)),
                None => com_printf(&format!("\"{}\" is undefined\n", name)),
            }
            return;
        }

        let value = self.cmd_args_from(2);
        self.alias_set(&name, &value);
    }

    /// unalias [-h|-a] <name>
    fn unalias_f(&mut self) {
        const OPTIONS: &[CmdOption] = &[
            CmdOption {
                sh: "h",
                lo: "help",
                help: "display this message",
            },
            CmdOption {
                sh: "a",
                lo: "all",
                help: "delete everything",
            },
        ];

        while let Some(c) = self.cmd_parse_options(OPTIONS) {
            match c {
                'h' => {
                    self.cmd_print_usage(OPTIONS, Some("[name]"));
                    self.cmd_print_help(OPTIONS);
                    return;
                }
                'a' => {
                    self.alias_remove_all();
                    com_printf("Removed all alias commands.\n");
                    return;
                }
                _ => return,
            }
        }

        let name = self.cmd_optarg().to_string();
        if name.is_empty() {
            com_printf(&format!(
                "Missing alias name.\nTry {} --help for more information.\n",
                self.cmd_argv(0)
            ));
            return;
        }

        if !self.alias_remove(&name) {
            com_printf(&format!("\"{}\" is undefined.\n", name));
        }
    }

    /// cmdlist [filter]
    fn cmdlist_f(&self) {
        let filter = if self.cmd_argc() > 1 {
            Some(self.cmd_argv(1))
        } else {
            None
        };
        let mut shown = 0;
        for c in &self.commands {
            if let Some(pat) = filter {
                if !wildcard_match(pat, &c.name) {
                    continue;
                }
            }
            com_printf(&format!("{}\n", c.name));
            shown += 1;
        }
        com_printf(&format!("{} of {} commands\n", shown, self.commands.len()));
    }

    /// macrolist [filter]
    fn macrolist_f(&self) {
        let filter = if self.cmd_argc() > 1 {
            Some(self.cmd_argv(1))
        } else {
            None
        };
        let mut shown = 0;
        for m in &self.macros {
            if let Some(pat) = filter {
                if !wildcard_match(pat, &m.name) {
                    continue;
                }
            }
            com_printf(&format!("{:<16} {}\n", m.name, (m.format)()));
            shown += 1;
        }
        com_printf(&format!("{} of {} macros\n", shown, self.macros.len()));
    }

    /// text — re-queue the rest of the line as a statement.
    fn text_f(&mut self) {
        let args = self.cmd_args();
        self.cbuf_add_text(&args);
        self.cbuf_add_text("\n");
    }

    /// complete <name> — register a completion placeholder.
    fn complete_f(&mut self) {
        if self.cmd_argc() < 2 {
            com_printf(&format!("Usage: {} <command>\n", self.cmd_argv(0)));
            return;
        }
        let name = self.cmd_argv(1).to_string();
        self.cmd_add_placeholder(&name);
    }

    // ========================================================
    // Initialization
    // ========================================================

    /// Register the builtin script commands.
    pub fn cmd_init(&mut self) {
        self.cmd_add_command("cmdlist", Box::new(|ctx| ctx.cmdlist_f()));
        self.cmd_add_command("macrolist", Box::new(|ctx| ctx.macrolist_f()));
        self.cmd_add_command("exec", Box::new(|ctx| ctx.exec_f()));
        self.cmd_add_command("echo", Box::new(|ctx| ctx.echo_f()));
        self.cmd_add_command("alias", Box::new(|ctx| ctx.alias_f()));
        self.cmd_add_command("unalias", Box::new(|ctx| ctx.unalias_f()));
        self.cmd_add_command("wait", Box::new(|ctx| ctx.wait_f()));
        self.cmd_add_command("text", Box::new(|ctx| ctx.text_f()));
        self.cmd_add_command("complete", Box::new(|ctx| ctx.complete_f()));
    }
}

impl Default for CmdSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn option_takes_arg(o: &CmdOption) -> bool {
    o.sh.len() > 1 && o.sh.as_bytes()[1] == b':'
}

// ============================================================
// Tests
// ============================================================
