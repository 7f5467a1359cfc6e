//! Headless study participant: drives a `CallController` from relay traffic,
//! content fetches and stdin commands.

use log::{info, warn};
use selah_core::narration::Narrator;
use selah_core::{
    catalog, Action, CallController, Collaborators, Event, Passage, Request, Role, SessionConfig, StudyCoach,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::assistant::HttpAssistant;
use crate::config::Config;
use crate::content::HttpContent;
use crate::devices::{DeviceEvents, NoEncoder, VirtualDevices};
use crate::speech::ConsoleSpeech;
use crate::transport::{tcp_connector, RelayHandle, RelaySubstrate};

const USAGE: &str = "commands: goto <book> <chapter> | next | prev | verse <n> | chat <text> | hand | \
mute | video | share | layout | read | pause | resume | hush | record | stop | save [title] | discard | \
sessions | notes [verse] | ask <question> | leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Goto { book_id: String, chapter: u32 },
    Next,
    Prev,
    Verse(u32),
    Chat(String),
    Hand,
    Mute,
    Video,
    Share,
    Layout,
    Read,
    Pause,
    Resume,
    Hush,
    Record,
    Stop,
    Save(Option<String>),
    Discard,
    Sessions,
    Notes(Option<u32>),
    Ask(String),
    Leave,
    Help,
}

/// Parse one stdin line. `None` for a blank line.
pub fn parse_command(line: &str) -> Option<Result<Command, &'static str>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "goto" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next().map(str::parse::<u32>)) {
                (Some(book), Some(Ok(chapter))) => Ok(Command::Goto {
                    book_id: book.to_ascii_lowercase(),
                    chapter,
                }),
                _ => Err("usage: goto <book> <chapter>"),
            }
        }
        "next" => Ok(Command::Next),
        "prev" => Ok(Command::Prev),
        "verse" => rest
            .parse()
            .map(Command::Verse)
            .map_err(|_| "usage: verse <n>"),
        "chat" => Ok(Command::Chat(rest.to_string())),
        "hand" => Ok(Command::Hand),
        "mute" => Ok(Command::Mute),
        "video" => Ok(Command::Video),
        "share" => Ok(Command::Share),
        "layout" => Ok(Command::Layout),
        "read" => Ok(Command::Read),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "hush" => Ok(Command::Hush),
        "record" => Ok(Command::Record),
        "stop" => Ok(Command::Stop),
        "save" => Ok(Command::Save((!rest.is_empty()).then(|| rest.to_string()))),
        "discard" => Ok(Command::Discard),
        "sessions" => Ok(Command::Sessions),
        "notes" if rest.is_empty() => Ok(Command::Notes(None)),
        "notes" => rest
            .parse()
            .map(|n| Command::Notes(Some(n)))
            .map_err(|_| "usage: notes [verse]"),
        "ask" if rest.is_empty() => Err("usage: ask <question>"),
        "ask" => Ok(Command::Ask(rest.to_string())),
        "leave" | "quit" | "exit" => Ok(Command::Leave),
        "help" | "?" => Ok(Command::Help),
        _ => Err(USAGE),
    };
    Some(cmd)
}

/// Verse for the assistant: the given one, else the highlighted one, in the loaded chapter.
fn passage(call: &CallController, verse: Option<u32>) -> Result<Passage, &'static str> {
    let sync = call.sync();
    let chapter = sync.chapter_data().ok_or("no chapter loaded")?;
    let verse = verse.or(sync.active_verse()).ok_or("pick a verse: `notes <n>`")?;
    let book_name = catalog::find(sync.book_id()).map_or(sync.book_id(), |b| b.name);
    Passage::select(chapter, book_name, verse).ok_or("no such verse in this chapter")
}

fn apply(call: &mut CallController, narrator: &mut Narrator, coach: &mut StudyCoach, cmd: Command) -> Vec<Action> {
    match cmd {
        Command::Goto { book_id, chapter } => call.navigate(&book_id, chapter),
        Command::Next => call.next_chapter(),
        Command::Prev => call.prev_chapter(),
        Command::Verse(n) => call.tap_verse(n),
        Command::Chat(text) => call.send_chat(&text),
        Command::Hand => call.toggle_hand(),
        Command::Mute => call.toggle_mute(),
        Command::Video => call.toggle_video(),
        Command::Share => call.toggle_screen_share(),
        Command::Layout => call.toggle_layout(),
        Command::Read => {
            match call.sync().chapter_data() {
                Some(c) => {
                    let reference = c.reference.clone();
                    narrator.speak(&c.content, move || println!("[read] end of {reference}"));
                }
                None => println!("[read] no chapter loaded"),
            }
            Vec::new()
        }
        Command::Pause => {
            narrator.pause();
            Vec::new()
        }
        Command::Resume => {
            narrator.resume();
            Vec::new()
        }
        Command::Hush => {
            narrator.stop();
            Vec::new()
        }
        Command::Record => call.start_recording(true),
        Command::Stop => call.stop_recording(),
        Command::Save(title) => call.save_recording(title.as_deref()),
        Command::Discard => call.discard_recording(),
        Command::Sessions => {
            for s in call.library().list() {
                println!("  {}  {}  {}  {}", s.id, s.title, s.duration, s.download_name());
            }
            Vec::new()
        }
        Command::Notes(verse) => {
            match passage(call, verse) {
                Ok(p) => {
                    let citation = p.citation();
                    println!("[assistant] {}", coach.open(p));
                    println!("[assistant] preparing notes on {citation}...");
                }
                Err(why) => println!("[assistant] {why}"),
            }
            Vec::new()
        }
        Command::Ask(question) => {
            if coach.passage().is_none() {
                println!("[assistant] open a verse with `notes [verse]` first");
            } else if !coach.ask(&question) {
                println!("[assistant] still thinking...");
            }
            Vec::new()
        }
        Command::Help => {
            println!("{USAGE}");
            Vec::new()
        }
        Command::Leave => {
            narrator.stop();
            call.hang_up()
        }
    }
}

/// Terminal rendering of one UI action.
pub fn render(action: &Action) -> String {
    match action {
        Action::ViewChanged(v) => format!("[view] {v:?}"),
        Action::RoomCreated(room) => format!("[room] {room} (share this id to invite)"),
        Action::Status(s) => format!("[status] {s}"),
        Action::ParticipantsChanged(list) => {
            let ids: Vec<String> = list
                .iter()
                .map(|p| {
                    let mut s = p.id.short().to_string();
                    if p.stream.is_none() {
                        s.push_str(" (connecting)");
                    }
                    if p.hand_raised {
                        s.push_str(" (hand)");
                    }
                    s
                })
                .collect();
            format!("[peers] {} connected: {}", list.len(), ids.join(", "))
        }
        Action::LayoutChanged(l) => format!("[layout] {l:?}"),
        Action::ChapterRequested { book_id, chapter } => {
            format!("[loading] {}", catalog::reference(book_id, *chapter))
        }
        Action::ChapterShown(c) => {
            let mut out = format!("== {} ==", c.reference);
            for v in &c.verses {
                out.push_str(&format!("\n{:>3} {}", v.number, v.text));
            }
            out
        }
        Action::ScrollToVerse(n) => format!("[verse] {n}"),
        Action::ChatAppended(m) if m.system => format!("* {}", m.text),
        Action::ChatAppended(m) => {
            format!("{} <{}> {}", m.timestamp.format("%H:%M"), m.sender, m.text)
        }
        Action::HandChanged { peer, raised } => {
            format!("[hand] {} {}", peer.short(), if *raised { "raised" } else { "lowered" })
        }
        Action::LocalHandChanged(raised) => {
            format!("[hand] yours {}", if *raised { "raised" } else { "lowered" })
        }
        Action::OutboundChanged {
            source,
            muted,
            video_off,
        } => format!("[outbound] {source:?} muted={muted} video_off={video_off}"),
        Action::DeviceDenied(s) => format!("[device] {s}"),
        Action::RecordingStarted(src) => format!("[rec] recording {src:?}"),
        Action::RecordingStopped => "[rec] stopped".to_string(),
        Action::RecordingPending {
            suggested_title,
            duration,
        } => format!("[rec] {duration} captured; `save [title]` (default \"{suggested_title}\") or `discard`"),
        Action::RecordingSaved { id, title } => format!("[rec] saved \"{title}\" as {id}"),
        Action::RecordingDiscarded => "[rec] discarded".to_string(),
        Action::RecordingFailed(s) => format!("[rec] {s}"),
    }
}

fn show(actions: &[Action]) {
    for a in actions {
        println!("{}", render(a));
    }
}

/// Feed device completions back into the controller until none remain.
fn drain_devices(call: &mut CallController, events: &DeviceEvents) {
    loop {
        let next = events.borrow_mut().pop_front();
        match next {
            Some(ev) => show(&call.handle(ev)),
            None => break,
        }
    }
}

/// Run a participant until `leave`, stdin EOF, or Ctrl+C or SIGTERM.
pub async fn run(cfg: Config, role: Role, room: Option<String>) -> anyhow::Result<()> {
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
    let (content_tx, mut content_rx) = mpsc::unbounded_channel();
    let (speech_tx, mut speech_rx) = mpsc::unbounded_channel();
    let (assistant_tx, mut assistant_rx) = mpsc::unbounded_channel();
    let mut coach = StudyCoach::new(Box::new(HttpAssistant::new(
        &cfg.assistant_url,
        &cfg.assistant_model,
        cfg.assistant_key.clone(),
        assistant_tx,
    )?));
    let mut narrator = Narrator::new(Box::new(ConsoleSpeech::new(speech_tx)));
    let device_events = DeviceEvents::default();
    let relay = RelayHandle::new(RelaySubstrate::new(tcp_connector(cfg.relay_addr(), relay_tx)));

    let mut call = CallController::new(
        Collaborators {
            substrate: Box::new(relay.clone()),
            devices: Box::new(VirtualDevices::new(device_events.clone())),
            recording: Box::new(NoEncoder),
            content: Box::new(HttpContent::new(&cfg.content_url, &cfg.translation, content_tx)?),
        },
        SessionConfig {
            mobile: cfg.mobile,
            ..SessionConfig::default()
        },
    );

    match role {
        Role::Host => {
            show(&call.create_room()?);
            drain_devices(&mut call, &device_events);
            show(&call.enter_call()?);
        }
        Role::Joiner => {
            show(&call.start_join()?);
            drain_devices(&mut call, &device_events);
            show(&call.join(room.as_deref().unwrap_or_default())?);
        }
    }
    drain_devices(&mut call, &device_events);
    info!("participant: relay {}, type `help` for commands", cfg.relay_addr());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stop = crate::stop_requested();
    tokio::pin!(stop);
    loop {
        let actions = tokio::select! {
            Some(inbound) = relay_rx.recv() => relay
                .translate(inbound)
                .into_iter()
                .flat_map(|ev| call.handle(ev))
                .collect::<Vec<_>>(),
            Some((ticket, chapter)) = content_rx.recv() => {
                call.handle(Event::ChapterLoaded { ticket, chapter })
            }
            Some(id) = speech_rx.recv() => {
                narrator.on_utterance_end(id);
                Vec::new()
            }
            Some((ticket, text)) = assistant_rx.recv() => {
                match coach.on_reply(ticket, text) {
                    Some((Request::Notes, notes)) => println!("[notes]\n{notes}"),
                    Some((Request::Chat, reply)) => println!("[assistant] {reply}"),
                    None => {}
                }
                Vec::new()
            }
            line = lines.next_line() => match line? {
                Some(line) => match parse_command(&line) {
                    Some(Ok(Command::Leave)) => {
                        show(&apply(&mut call, &mut narrator, &mut coach, Command::Leave));
                        break;
                    }
                    Some(Ok(cmd)) => apply(&mut call, &mut narrator, &mut coach, cmd),
                    Some(Err(usage)) => {
                        println!("{usage}");
                        Vec::new()
                    }
                    None => Vec::new(),
                },
                None => {
                    show(&call.hang_up());
                    break;
                }
            },
            res = &mut stop => {
                match res {
                    Ok(why) => info!("participant: leaving ({why:?})"),
                    Err(e) => warn!("participant: signal handler failed: {e}"),
                }
                show(&call.hang_up());
                break;
            }
        };
        show(&actions);
        drain_devices(&mut call, &device_events);
    }
    Ok(())
}
