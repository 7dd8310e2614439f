//! The unit of work flowing through a worker.
//!
//! An [`Event`] pairs a serializable payload ([`EventData`]) with the
//! synchronization block that lets callers treat asynchronous dispatch as a
//! call: handlers register pending tokens, signal [`ready`](Event::ready) when
//! they are done, and a caller blocked in [`wait`](Event::wait) collects the
//! result queue.
//!
//! Events are shared as `Arc<Event>`. Mutable payload fields live behind a
//! read/write lock and are edited through [`Event::update`].
//!
//! # Lifecycle
//!
//! ```text
//! New ──bind──► Bound ──dispatch──► Dispatching ──leave/verify──► Done
//! ```
//!
//! Status only moves forward. Every stage that observes `Done` skips the event.
//!
//! # Forking
//!
//! [`Event::fork`] copies the payload into a brand-new event with its own token,
//! pending set, condition variable and queues. Nothing about the fork's
//! completion is visible to the original's waiters.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::category::EventCategory;
use super::pipeline;
use crate::error::ChatError;
use crate::framework::RegistryView;
use crate::integration::{Bot, BoxedBot, User};

/// Literal separator splitting a command line into pipeline stages.
pub const PIPE_SEPARATOR: &str = " ! ";

/// Priority given to events that do not ask for one. Lower is sooner.
pub const DEFAULT_SPEED: u8 = 5;

/// Control characters used when neither channel nor global ones are configured.
pub const DEFAULT_CONTROL_CHARS: &str = "!;";

const WAIT_STEP: Duration = Duration::from_millis(100);

/// Hand-off channel linking two pipeline stages.
///
/// Identity matters: stage `i`'s input queue *is* stage `i - 1`'s output queue.
pub type HandOff = Arc<Mutex<VecDeque<String>>>;

fn new_handoff() -> HandOff {
    Arc::new(Mutex::new(VecDeque::new()))
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EventStatus {
    /// Created, not yet bound.
    New = 0,
    /// Channel and user resolved.
    Bound = 1,
    /// Handed to a command handler.
    Dispatching = 2,
    /// Terminal; later stages skip the event.
    Done = 3,
}

impl EventStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Bound,
            2 => Self::Dispatching,
            _ => Self::Done,
        }
    }
}

// ─── Payload ──────────────────────────────────────────────────────────────────

/// Routing flags carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFlags {
    /// Never dispatched to commands and never tracked for waiting.
    pub nodispatch: bool,
    /// Skip [`Event::bind`] unless forced.
    pub dontbind: bool,
    /// Output is buffered for the next pipeline stage.
    pub pipelined: bool,
    /// Re-dispatched on behalf of another bot.
    pub forwarded: bool,
    /// [`Event::bind`] already ran.
    pub bonded: bool,
    /// Payload arrived inside a remote envelope.
    pub remote: bool,
    /// Text was recognized as a command.
    pub iscommand: bool,
    /// All three chains finished.
    pub callback_done: bool,
    /// Replies are recorded but not transmitted.
    pub nooutput: bool,
    /// Replies go to the sender privately.
    pub silent: bool,
    /// Received in a group context.
    pub groupchat: bool,
    /// The bot is joined to the event's channel.
    pub inchan: bool,
    /// Replies are transmitted whole instead of chopped.
    pub showall: bool,
}

/// Serializable payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventData {
    pub category: EventCategory,
    /// Name of the worker the event belongs to.
    pub bot_name: String,
    /// Raw text.
    pub txt: String,
    /// Sender identity as reported by the protocol (userhost, JID, ...).
    pub origin: String,
    /// Authenticated identity, when it differs from `origin`.
    pub auth: String,
    pub nick: String,
    pub channel: String,
    /// Queue priority; lower is sooner.
    pub speed: u8,
    /// Remaining hops before the event is marked done.
    pub ttl: u32,
    /// Text after the control character or nick prefix.
    pub execstr: String,
    /// First word of `execstr`.
    pub usercmnd: String,
    pub args: Vec<String>,
    /// `args` joined by single spaces.
    pub rest: String,
    /// Replacement text of the expanded alias.
    pub alias: String,
    /// Command word the alias replaced.
    pub aliased: String,
    /// Channel context resolved by [`Event::bind`].
    pub chan: Option<String>,
    /// User resolved by [`Event::bind`].
    pub user: Option<User>,
    pub flags: EventFlags,
}

impl Default for EventData {
    fn default() -> Self {
        Self {
            category: EventCategory::default(),
            bot_name: String::new(),
            txt: String::new(),
            origin: String::new(),
            auth: String::new(),
            nick: String::new(),
            channel: String::new(),
            speed: DEFAULT_SPEED,
            ttl: 1,
            execstr: String::new(),
            usercmnd: String::new(),
            args: Vec::new(),
            rest: String::new(),
            alias: String::new(),
            aliased: String::new(),
            chan: None,
            user: None,
            flags: EventFlags::default(),
        }
    }
}

impl EventData {
    /// Creates a payload of the given category.
    pub fn new(category: EventCategory, txt: impl Into<String>) -> Self {
        Self {
            category,
            txt: txt.into(),
            ..Default::default()
        }
    }

    /// Sets origin and auth.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self.auth.clone_from(&self.origin);
        self
    }

    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = nick.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    /// Identity used for user lookup: `auth`, falling back to `origin`.
    pub fn target(&self) -> &str {
        if self.auth.is_empty() {
            &self.origin
        } else {
            &self.auth
        }
    }

    /// Where replies are addressed by default.
    pub fn reply_target(&self) -> &str {
        if self.flags.silent || self.channel.is_empty() {
            if self.nick.is_empty() {
                &self.origin
            } else {
                &self.nick
            }
        } else {
            &self.channel
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// An inbound or outbound unit of work.
pub struct Event {
    token: String,
    created: SystemTime,
    status: AtomicU8,
    stop: AtomicBool,
    data: RwLock<EventData>,

    busy: Mutex<VecDeque<String>>,
    finished: Condvar,
    inqueue: Mutex<HandOff>,
    outqueue: Mutex<HandOff>,
    resqueue: Mutex<Vec<String>>,
    prev: Mutex<Option<Arc<Event>>>,
}

impl Event {
    /// Creates an event with a fresh token and synchronization block.
    pub fn new(data: EventData) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            created: SystemTime::now(),
            status: AtomicU8::new(EventStatus::New as u8),
            stop: AtomicBool::new(false),
            data: RwLock::new(data),
            busy: Mutex::new(VecDeque::new()),
            finished: Condvar::new(),
            inqueue: Mutex::new(new_handoff()),
            outqueue: Mutex::new(new_handoff()),
            resqueue: Mutex::new(Vec::new()),
            prev: Mutex::new(None),
        }
    }

    /// Shorthand for a command event carrying `txt`.
    pub fn command(txt: impl Into<String>) -> Self {
        Self::new(EventData::new(EventCategory::Command, txt))
    }

    /// Copies the payload into an independent event.
    ///
    /// The fork gets a new token, status `New`, and its own pending set,
    /// condition variable and queues.
    pub fn fork(&self) -> Event {
        Event::new(self.snapshot())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    // ─── Payload access ──────────────────────────────────────────────────────

    /// Read access to the payload.
    pub fn data(&self) -> RwLockReadGuard<'_, EventData> {
        self.data.read()
    }

    /// Edits the payload under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut EventData) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Clones the payload.
    pub fn snapshot(&self) -> EventData {
        self.data.read().clone()
    }

    pub fn category(&self) -> EventCategory {
        self.data.read().category.clone()
    }

    pub fn txt(&self) -> String {
        self.data.read().txt.clone()
    }

    pub fn speed(&self) -> u8 {
        self.data.read().speed
    }

    pub fn flags(&self) -> EventFlags {
        self.data.read().flags.clone()
    }

    pub fn is_command(&self) -> bool {
        self.data.read().flags.iscommand
    }

    /// Payloads that look like a serialized envelope: `{"` or `{&`.
    pub fn is_remote(&self) -> bool {
        let data = self.data.read();
        data.txt.starts_with("{\"") || data.txt.starts_with("{&")
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub fn status(&self) -> EventStatus {
        EventStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Moves the status forward; never moves it back.
    pub fn advance(&self, to: EventStatus) {
        self.status.fetch_max(to as u8, Ordering::AcqRel);
    }

    pub fn is_done(&self) -> bool {
        self.status() == EventStatus::Done
    }

    pub fn mark_done(&self) {
        self.advance(EventStatus::Done);
    }

    /// Lowers the time-to-live; at zero the event is done.
    pub fn leave(&self) {
        let ttl = self.update(|d| {
            d.ttl = d.ttl.saturating_sub(1);
            d.ttl
        });
        if ttl == 0 {
            self.mark_done();
        }
    }

    /// Stops chain propagation and releases waiters.
    pub fn set_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _busy = self.busy.lock();
        self.finished.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    // ─── Synchronous waiting ─────────────────────────────────────────────────

    /// Registers the event's own token as pending.
    pub fn startout(&self) {
        let token = self.token.clone();
        self.add_pending(token);
    }

    /// Registers a pending handler token. No-op for `nodispatch` events.
    pub fn add_pending(&self, token: impl Into<String>) {
        if self.data.read().flags.nodispatch {
            return;
        }
        let token = token.into();
        let mut busy = self.busy.lock();
        if !busy.contains(&token) {
            busy.push_back(token);
        }
    }

    /// Number of handlers that have not signalled yet.
    pub fn pending(&self) -> usize {
        self.busy.lock().len()
    }

    /// Signals that the event's own work is finished.
    pub fn ready(&self, force: bool) {
        self.ready_for(&self.token, force);
    }

    /// Removes `token` from the pending set; wakes waiters once it is empty
    /// or when `force` is set.
    pub fn ready_for(&self, token: &str, force: bool) {
        let (nodispatch, noisy) = {
            let data = self.data.read();
            (data.flags.nodispatch, data.category.is_noisy())
        };
        if nodispatch {
            return;
        }
        let mut busy = self.busy.lock();
        if let Some(pos) = busy.iter().position(|t| t == token) {
            busy.remove(pos);
        }
        if busy.is_empty() || force {
            self.finished.notify_all();
            if !noisy {
                trace!(token = %self.token, "Event ready, waiters notified");
            }
        }
    }

    /// Blocks until the pending set empties, the event is stopped or
    /// `timeout` elapses, then drains the result queue.
    ///
    /// Returns immediately when nothing is pending.
    pub fn wait(&self, timeout: Duration) -> Vec<String> {
        let mut busy = self.busy.lock();
        let mut budget = timeout;
        while !busy.is_empty() && !self.is_stopped() && !budget.is_zero() {
            let step = budget.min(WAIT_STEP);
            self.finished.wait_for(&mut busy, step);
            budget = budget.saturating_sub(step);
        }
        if !busy.is_empty() {
            debug!(token = %self.token, pending = busy.len(), "Wait budget exhausted");
        }
        drop(busy);
        self.take_results()
    }

    // ─── Queues ──────────────────────────────────────────────────────────────

    /// Appends a reply to the result queue.
    pub fn push_result(&self, txt: impl Into<String>) {
        self.resqueue.lock().push(txt.into());
    }

    /// Copies the result queue.
    pub fn results(&self) -> Vec<String> {
        self.resqueue.lock().clone()
    }

    /// Drains the result queue.
    pub fn take_results(&self) -> Vec<String> {
        std::mem::take(&mut *self.resqueue.lock())
    }

    pub fn inqueue(&self) -> HandOff {
        Arc::clone(&self.inqueue.lock())
    }

    pub fn outqueue(&self) -> HandOff {
        Arc::clone(&self.outqueue.lock())
    }

    pub fn set_inqueue(&self, queue: HandOff) {
        *self.inqueue.lock() = queue;
    }

    pub fn set_outqueue(&self, queue: HandOff) {
        *self.outqueue.lock() = queue;
    }

    /// Pushes text to the output hand-off queue.
    pub fn push_output(&self, txt: impl Into<String>) {
        self.outqueue().lock().push_back(txt.into());
    }

    /// Drains the input hand-off queue.
    pub fn take_input(&self) -> Vec<String> {
        self.inqueue().lock().drain(..).collect()
    }

    /// Previous pipeline stage, if any.
    pub fn prev(&self) -> Option<Arc<Event>> {
        self.prev.lock().clone()
    }

    pub fn set_prev(&self, prev: Option<Arc<Event>>) {
        *self.prev.lock() = prev;
    }

    // ─── Binding ─────────────────────────────────────────────────────────────

    /// Derives `execstr`, `usercmnd`, `args` and `rest` from the text.
    pub fn prepare(&self, bot: &dyn Bot) {
        let channel = self.data.read().channel.clone();
        let cc = normalize_control_chars(&bot.control_chars(&channel));
        let nick = bot.nick();

        let mut data = self.data.write();
        if data.txt.is_empty() {
            return;
        }
        let detected = command_string(&data.txt, &cc, &nick).or_else(|| {
            (data.flags.iscommand && !data.execstr.is_empty()).then(|| data.execstr.clone())
        });
        match detected {
            Some(execstr) => {
                data.usercmnd = execstr
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                data.execstr = execstr;
                data.flags.nodispatch = false;
                data.flags.iscommand = true;
            }
            None => {
                if !data.category.is_noisy() {
                    trace!(category = %data.category, "No command detected");
                }
            }
        }
        make_args(&mut data);
    }

    /// Resolves the channel context and the acting user.
    ///
    /// Idempotent unless `force` is set. A command from an origin without a
    /// user is marked `nodispatch` instead of failing.
    pub fn bind(&self, bot: &dyn Bot, force: bool) {
        {
            let data = self.data.read();
            if !force && data.flags.dontbind {
                trace!("dontbind set, not binding");
                return;
            }
            if !force && data.flags.bonded {
                return;
            }
        }

        self.update(|d| {
            if d.chan.is_none() {
                if !d.channel.is_empty() {
                    d.chan = Some(d.channel.clone());
                } else if !d.origin.is_empty() {
                    d.chan = Some(d.origin.clone());
                }
            }
        });
        self.prepare(bot);

        let (target, nick, channel, has_user, nodispatch, iscommand) = {
            let d = self.data.read();
            (
                d.target().to_string(),
                d.nick.clone(),
                d.channel.clone(),
                d.user.is_some(),
                d.flags.nodispatch,
                d.flags.iscommand,
            )
        };

        if target.is_empty() {
            self.update(|d| d.flags.bonded = true);
            self.advance(EventStatus::Bound);
            return;
        }

        if !has_user && !nodispatch {
            let users = bot.users();
            let mut user = users.get_user(&target);
            if user.is_none() && bot.auto_register() && iscommand {
                user = users.add_guest(&target, &nick);
                match &user {
                    Some(u) => warn!(origin = %target, user = %u.name, "auto_register applied"),
                    None => error!(origin = %target, "Cannot add guest to user directory"),
                }
            }
            if let Some(u) = user {
                info!(
                    user = %u.name,
                    command = %self.data.read().usercmnd,
                    bot = %bot.name(),
                    "User bound"
                );
                self.update(|d| d.user = Some(u));
            }
        }

        let inchan = !channel.is_empty() && bot.is_joined(&channel);
        self.update(|d| {
            if d.user.is_none() && d.flags.iscommand {
                warn!(origin = %target, "No user found for command");
                d.flags.nodispatch = true;
            }
            d.flags.inchan = inchan;
            d.flags.bonded = true;
        });
        self.advance(EventStatus::Bound);
    }

    // ─── Execution ───────────────────────────────────────────────────────────

    /// Dispatches the event against the bot's current registry view.
    pub fn execute(self: &Arc<Self>, bot: &BoxedBot) -> Arc<Event> {
        self.execute_with(&bot.registry().view(), bot)
    }

    /// Dispatches the event against the command table of `view`.
    ///
    /// The command word is alias-expanded first. Text containing
    /// [`PIPE_SEPARATOR`] is then split into a pipeline whose stages run on
    /// the calling thread. Lookup, permission and requirement failures are
    /// reported and contained. Returns the event whose output reaches the
    /// caller: the last pipeline stage, or `self`.
    pub fn execute_with(self: &Arc<Self>, view: &RegistryView, bot: &BoxedBot) -> Arc<Event> {
        self.startout();
        self.bind(bot.as_ref(), true);
        if let Some(aliases) = bot.aliases() {
            aliases.apply(self, bot.as_ref());
        }

        let (pipelined, piped) = {
            let d = self.data.read();
            (d.flags.pipelined, d.txt.contains(PIPE_SEPARATOR))
        };
        if !pipelined && piped {
            return match pipeline::dopipe(self, view, bot, true) {
                Ok(mut stages) => stages.pop().unwrap_or_else(|| Arc::clone(self)),
                Err(err) => {
                    self.report(bot, &err);
                    self.ready(false);
                    Arc::clone(self)
                }
            };
        }

        if let Err(err) = view.commands.dispatch(bot, self) {
            self.report(bot, &err);
            self.ready(false);
        }
        Arc::clone(self)
    }

    fn report(self: &Arc<Self>, bot: &BoxedBot, err: &ChatError) {
        match err {
            ChatError::Require(reason) => {
                error!(reason = %reason, "Command requirement not met");
            }
            ChatError::NoSuchCommand(command) => {
                warn!(command = %command, "No such command");
                self.reply(bot, format!("no such command: {command}"));
            }
            ChatError::NoSuchUser(origin) => {
                error!(origin = %origin, "No user for command");
            }
            ChatError::PermissionDenied { command, user } => {
                warn!(command = %command, user = %user, "Permission denied");
                self.reply(bot, err.to_string());
            }
            other if other.is_recoverable() => warn!(error = %other, "Command declined"),
            other => error!(error = %other, "Command dispatch failed"),
        }
    }

    // ─── Replies ─────────────────────────────────────────────────────────────

    pub fn reply(self: &Arc<Self>, bot: &BoxedBot, txt: impl AsRef<str>) {
        self.reply_with(bot, txt, &[]);
    }

    /// Replies with `txt` followed by `result`.
    pub fn reply_with(self: &Arc<Self>, bot: &BoxedBot, txt: impl AsRef<str>, result: &[String]) {
        let target = self.data.read().reply_target().to_string();
        bot.say(&target, txt.as_ref(), result, Some(self));
    }

    /// Tells the user which arguments are missing.
    ///
    /// For an aliased command the usage is shown under the alias, without
    /// the arguments the alias already supplies.
    pub fn missing(self: &Arc<Self>, bot: &BoxedBot, usage: &str) {
        let (command, skip) = {
            let d = self.data.read();
            if d.aliased.is_empty() {
                (d.usercmnd.clone(), 0)
            } else {
                let supplied = d.alias.split_whitespace().count().saturating_sub(1);
                (d.aliased.clone(), supplied)
            }
        };
        let usage = usage.split_whitespace().skip(skip).collect::<Vec<_>>().join(" ");
        self.reply(bot, format!("{command} {usage}"));
    }

    /// Tells the user the command finished.
    pub fn done(self: &Arc<Self>, bot: &BoxedBot) {
        let label = {
            let d = self.data.read();
            if d.usercmnd.is_empty() {
                d.txt.clone()
            } else {
                d.usercmnd.clone()
            }
        };
        self.reply(bot, format!("done - {label}"));
    }

    /// Records an outgoing reply and returns the text to transmit, if any.
    ///
    /// See [`buffer_piped`](Self::buffer_piped) and
    /// [`record_rendered`](Self::record_rendered).
    pub fn record_reply(&self, txt: &str, result: &[String], dot: &str) -> Option<String> {
        if self.buffer_piped(txt, result) {
            return None;
        }
        self.record_rendered(make_response(txt, result, dot), result)
    }

    /// Buffers `result` (or `txt` when `result` is empty) on the output
    /// hand-off queue of a pipelined event. Returns `false` for any other
    /// event.
    pub fn buffer_piped(&self, txt: &str, result: &[String]) -> bool {
        if !self.data.read().flags.pipelined {
            return false;
        }
        let queue = self.outqueue();
        let mut queue = queue.lock();
        if result.is_empty() {
            queue.push_back(txt.to_string());
        } else {
            queue.extend(result.iter().cloned());
        }
        true
    }

    /// Puts an already rendered reply on the result queue and returns it
    /// for transmission. `nooutput` events only signal
    /// [`ready`](Self::ready) and transmit nothing.
    pub fn record_rendered(&self, rendered: String, result: &[String]) -> Option<String> {
        if rendered.is_empty() {
            return None;
        }
        if !result.is_empty() {
            self.outqueue().lock().extend(result.iter().cloned());
        }
        self.push_result(rendered.clone());
        if self.data.read().flags.nooutput {
            self.ready(false);
            return None;
        }
        Some(rendered)
    }

    // ─── Serialization ───────────────────────────────────────────────────────

    /// Serializes the payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.data.read())
    }

    /// Builds an event from a serialized payload.
    pub fn from_json(json: &str) -> serde_json::Result<Event> {
        Ok(Event::new(serde_json::from_str(json)?))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("Event")
            .field("token", &self.token)
            .field("category", &data.category)
            .field("txt", &data.txt)
            .field("status", &self.status())
            .finish()
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Applies the control-character defaults: `"!;"` when empty, `';'` always present.
pub fn normalize_control_chars(cc: &str) -> String {
    let mut cc = if cc.is_empty() {
        DEFAULT_CONTROL_CHARS.to_string()
    } else {
        cc.to_string()
    };
    if !cc.contains(';') {
        cc.push(';');
    }
    cc
}

/// Returns the command part of `txt`, if it starts with a control character
/// or is addressed to `nick` (`"nick:"` / `"nick,"`).
pub fn command_string(txt: &str, cc: &str, nick: &str) -> Option<String> {
    let first = txt.chars().next()?;
    if cc.contains(first) {
        return Some(txt[first.len_utf8()..].trim_start().to_string());
    }
    if nick.is_empty() {
        return None;
    }
    [':', ','].iter().find_map(|sep| {
        txt.strip_prefix(nick)
            .and_then(|rest| rest.strip_prefix(*sep))
            .map(|rest| rest.trim_start().to_string())
    })
}

fn make_args(data: &mut EventData) {
    let mut words = data.execstr.split_whitespace();
    if words.next().is_none() {
        data.args.clear();
        data.rest.clear();
        return;
    }
    data.args = words.map(str::to_string).collect();
    data.rest = data.args.join(" ");
}

/// Joins `result` behind `txt` with `dot`.
pub fn make_response(txt: &str, result: &[String], dot: &str) -> String {
    if result.is_empty() {
        txt.to_string()
    } else {
        format!("{txt}{}", result.join(dot))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::testing::MockBot;

    #[test]
    fn test_command_string() {
        assert_eq!(command_string("!echo hi", "!;", "bot"), Some("echo hi".into()));
        assert_eq!(command_string(";echo", "!;", "bot"), Some("echo".into()));
        assert_eq!(command_string("bot: echo hi", "!", "bot"), Some("echo hi".into()));
        assert_eq!(command_string("bot, echo", "!", "bot"), Some("echo".into()));
        assert_eq!(command_string("hello there", "!;", "bot"), None);
        assert_eq!(command_string("", "!;", "bot"), None);
    }

    #[test]
    fn test_normalize_control_chars() {
        assert_eq!(normalize_control_chars(""), "!;");
        assert_eq!(normalize_control_chars("."), ".;");
        assert_eq!(normalize_control_chars("!;"), "!;");
    }

    #[test]
    fn test_prepare_populates_args() {
        let bot = MockBot::new();
        let event = Event::command("!echo hello world");
        event.prepare(bot.as_ref());

        let data = event.data();
        assert!(data.flags.iscommand);
        assert_eq!(data.usercmnd, "echo");
        assert_eq!(data.args, vec!["hello", "world"]);
        assert_eq!(data.rest, "hello world");
    }

    #[test]
    fn test_bind_without_user_marks_nodispatch() {
        let bot = MockBot::new();
        let event = Event::new(EventData::new(EventCategory::Command, "!echo hi").with_origin("stranger"));
        event.bind(bot.as_ref(), false);

        assert!(event.flags().bonded);
        assert!(event.flags().nodispatch);
        assert_eq!(event.status(), EventStatus::Bound);
    }

    #[test]
    fn test_bind_auto_registers_guest() {
        let bot = MockBot::new().with_auto_register();
        let event = Event::new(EventData::new(EventCategory::Command, "!echo hi").with_origin("newbie"));
        event.bind(bot.as_ref(), false);

        let data = event.data();
        assert!(!data.flags.nodispatch);
        assert_eq!(data.user.as_ref().map(|u| u.name.as_str()), Some("newbie"));
    }

    #[test]
    fn test_bind_is_idempotent_unless_forced() {
        let bot = MockBot::new();
        let event = Event::new(EventData::new(EventCategory::Message, "hi").with_origin("alice"));
        event.bind(bot.as_ref(), false);
        event.update(|d| d.user = None);

        event.bind(bot.as_ref(), false);
        assert!(event.data().user.is_none());

        event.bind(bot.as_ref(), true);
        assert!(event.data().user.is_some());
    }

    #[test]
    fn test_status_is_monotonic() {
        let event = Event::command("x");
        event.advance(EventStatus::Dispatching);
        event.advance(EventStatus::Bound);
        assert_eq!(event.status(), EventStatus::Dispatching);
        event.mark_done();
        event.advance(EventStatus::New);
        assert!(event.is_done());
    }

    #[test]
    fn test_leave_marks_done_at_zero() {
        let event = Event::new(EventData {
            ttl: 2,
            ..EventData::new(EventCategory::Tick, "")
        });
        event.leave();
        assert!(!event.is_done());
        event.leave();
        assert!(event.is_done());
    }

    #[test]
    fn test_wait_without_pending_returns_immediately() {
        let event = Event::command("x");
        event.push_result("early");
        let start = Instant::now();
        let results = event.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(results, vec!["early"]);
    }

    #[test]
    fn test_wait_for_all_pending_handlers() {
        let event = Arc::new(Event::command("x"));
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            event.add_pending(format!("h{i}"));
        }

        let mut workers = Vec::new();
        for i in 0..3u64 {
            let event = Arc::clone(&event);
            let done = Arc::clone(&done);
            workers.push(thread::spawn(move || {
                thread::sleep(Duration::from_millis(30 * (i + 1)));
                event.push_result(format!("r{i}"));
                done.fetch_add(1, Ordering::SeqCst);
                event.ready_for(&format!("h{i}"), false);
            }));
        }

        let results = event.wait(Duration::from_secs(5));
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(event.pending(), 0);
        assert_eq!(results.len(), 3);
        for w in workers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_wait_times_out_with_partial_results() {
        let event = Event::command("x");
        event.add_pending("never");
        event.push_result("partial");
        let start = Instant::now();
        let results = event.wait(Duration::from_millis(250));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(results, vec!["partial"]);
    }

    #[test]
    fn test_stop_releases_waiter() {
        let event = Arc::new(Event::command("x"));
        event.add_pending("slow");
        let stopper = {
            let event = Arc::clone(&event);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                event.set_stop();
            })
        };
        let start = Instant::now();
        event.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
        stopper.join().unwrap();
    }

    #[test]
    fn test_nodispatch_is_never_tracked() {
        let event = Event::command("x");
        event.update(|d| d.flags.nodispatch = true);
        event.startout();
        assert_eq!(event.pending(), 0);
    }

    #[test]
    fn test_fork_has_independent_sync_state() {
        let original = Arc::new(Event::command("!echo hi"));
        original.startout();
        let fork = Arc::new(original.fork());

        assert_ne!(fork.token(), original.token());
        assert_eq!(fork.txt(), original.txt());
        assert_eq!(fork.pending(), 0);
        assert!(!Arc::ptr_eq(&fork.outqueue(), &original.outqueue()));

        fork.startout();
        fork.ready(true);
        assert_eq!(original.pending(), 1);

        let start = Instant::now();
        original.wait(Duration::from_millis(150));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_is_remote_and_json_round_trip() {
        let event = Event::new(
            EventData::new(EventCategory::Message, "{\"payload\": 1}")
                .with_origin("peer")
                .with_channel("#c"),
        );
        assert!(event.is_remote());

        let json = event.to_json().unwrap();
        let back = Event::from_json(&json).unwrap();
        assert_eq!(back.snapshot(), event.snapshot());
        assert_ne!(back.token(), event.token());
    }

    #[test]
    fn test_execute_expands_alias() {
        let bot = MockBot::new();
        bot.aliases_table().set("hi", "echo hello");
        bot.registry().update(|view| {
            view.commands.add(
                "basic",
                crate::framework::Command::new(
                    "echo",
                    crate::framework::handler(|bot, event| {
                        let rest = event.data().rest.clone();
                        event.reply(bot, rest);
                        Ok(crate::framework::Outcome::Handled)
                    }),
                ),
            )
        });
        let boxed: BoxedBot = bot.clone();

        let event = Arc::new(Event::new(EventData::new(EventCategory::Command, "!hi there").with_origin("alice")));
        event.execute(&boxed);
        assert_eq!(event.data().aliased, "hi");
        assert_eq!(bot.said(), vec!["hello there".to_string()]);
    }

    #[test]
    fn test_missing_names_alias() {
        let bot = MockBot::new();
        let boxed: BoxedBot = bot.clone();
        let event = Arc::new(Event::command("!greet"));
        event.update(|d| {
            d.usercmnd = "echo".into();
            d.alias = "echo hello".into();
            d.aliased = "greet".into();
        });
        event.missing(&boxed, "<greeting> <name>");
        assert_eq!(bot.said(), vec!["greet <name>".to_string()]);
    }

    #[test]
    fn test_record_reply_pipelined_and_nooutput() {
        let piped = Event::command("x");
        piped.update(|d| d.flags.pipelined = true);
        assert_eq!(piped.record_reply("hi", &[], ", "), None);
        assert_eq!(piped.outqueue().lock().pop_front().as_deref(), Some("hi"));
        assert!(piped.results().is_empty());

        let quiet = Event::command("x");
        quiet.update(|d| d.flags.nooutput = true);
        assert_eq!(quiet.record_reply("hi", &[], ", "), None);
        assert_eq!(quiet.results(), vec!["hi"]);

        let plain = Event::command("x");
        assert_eq!(plain.record_rendered("a - 1 more".into(), &[]), Some("a - 1 more".into()));
        assert_eq!(plain.results(), vec!["a - 1 more"]);
    }

    #[test]
    fn test_make_response() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(make_response("items: ", &items, ", "), "items: a, b");
        assert_eq!(make_response("none", &[], ", "), "none");
    }
}
