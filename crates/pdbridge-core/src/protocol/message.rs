//! Typed control messages and their wire encoding

use super::error::{FrameError, FrameResult};
use super::framing::{MessageReader, MessageWriter};

/// Leading class tag of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageClass {
    Global = 0,
    Object = 1,
    Patch = 2,
}

impl MessageClass {
    pub fn from_tag(tag: i32) -> FrameResult<Self> {
        match tag {
            0 => Ok(Self::Global),
            1 => Ok(Self::Object),
            2 => Ok(Self::Patch),
            other => Err(FrameError::UnknownClass(other)),
        }
    }
}

/// Editor-wide and lifecycle messages
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalMessage {
    /// Liveness heartbeat (both directions)
    Ping,
    /// Remote should exit
    Quit,
    /// Open a patch file by path
    OpenPatch(String),
    /// Close a patch by id
    ClosePatch(String),
    /// Audio device configuration from the host
    AudioStatus {
        inputs: i32,
        outputs: i32,
        device_state: String,
    },
    /// Master output gain
    Volume(f32),
    /// DSP on/off (host request, echoed back by the remote)
    Dsp(bool),
    /// Replace the interpreter search paths
    SearchPaths(Vec<String>),
    /// One line of interpreter console output
    Console(String),
}

/// A wire between an outlet and an inlet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub outlet: i32,
    pub source: String,
    pub inlet: i32,
    pub sink: String,
}

/// Snapshot of one object inside a patch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectState {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// One flag per inlet, `true` for signal inlets
    pub inlets: Vec<bool>,
    /// One flag per outlet, `true` for signal outlets
    pub outlets: Vec<bool>,
}

/// Entry of a `Sync` snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncItem {
    Object(ObjectState),
    Connection(Connection),
}

/// Edit commands and notifications scoped to one patch
#[derive(Debug, Clone, PartialEq)]
pub enum PatchMessage {
    CreateObject(String),
    RenameObject { object_id: String, name: String },
    RemoveSelection(Vec<String>),
    MoveSelection { dx: i32, dy: i32, selection: Vec<String> },
    CreateConnection(Connection),
    RemoveConnection(Connection),
    Copy(Vec<String>),
    Paste,
    Duplicate(Vec<String>),
    Undo,
    Redo,
    Encapsulate,
    RequestSync,
    Sync(Vec<SyncItem>),
    Select(Vec<String>),
}

/// Commands and notifications scoped to one object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMessage {
    SetText(String),
    SetWidth(i32),
    RequestSync,
}

/// A decoded control frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Global(GlobalMessage),
    Object {
        patch_id: String,
        object_id: String,
        message: ObjectMessage,
    },
    Patch {
        patch_id: String,
        message: PatchMessage,
    },
}

impl Message {
    pub fn patch(patch_id: impl Into<String>, message: PatchMessage) -> Self {
        Self::Patch {
            patch_id: patch_id.into(),
            message,
        }
    }

    pub fn object(
        patch_id: impl Into<String>,
        object_id: impl Into<String>,
        message: ObjectMessage,
    ) -> Self {
        Self::Object {
            patch_id: patch_id.into(),
            object_id: object_id.into(),
            message,
        }
    }

    pub fn class(&self) -> MessageClass {
        match self {
            Self::Global(_) => MessageClass::Global,
            Self::Object { .. } => MessageClass::Object,
            Self::Patch { .. } => MessageClass::Patch,
        }
    }

    /// Serialize into a frame
    pub fn encode(&self) -> Vec<u8> {
        let mut w = MessageWriter::new();
        w.write_i32(self.class() as i32);
        match self {
            Self::Global(message) => message.write(&mut w),
            Self::Object {
                patch_id,
                object_id,
                message,
            } => {
                w.write_str(patch_id).write_str(object_id);
                message.write(&mut w);
            }
            Self::Patch { patch_id, message } => {
                w.write_str(patch_id);
                message.write(&mut w);
            }
        }
        w.into_bytes()
    }

    /// Parse a frame
    pub fn decode(bytes: &[u8]) -> FrameResult<Self> {
        let mut r = MessageReader::new(bytes);
        match MessageClass::from_tag(r.read_i32()?)? {
            MessageClass::Global => Ok(Self::Global(GlobalMessage::read(&mut r)?)),
            MessageClass::Object => {
                let patch_id = r.read_string()?;
                let object_id = r.read_string()?;
                Ok(Self::Object {
                    patch_id,
                    object_id,
                    message: ObjectMessage::read(&mut r)?,
                })
            }
            MessageClass::Patch => {
                let patch_id = r.read_string()?;
                Ok(Self::Patch {
                    patch_id,
                    message: PatchMessage::read(&mut r)?,
                })
            }
        }
    }
}

impl From<GlobalMessage> for Message {
    fn from(message: GlobalMessage) -> Self {
        Self::Global(message)
    }
}

impl GlobalMessage {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Quit => "Quit",
            Self::OpenPatch(_) => "OpenPatch",
            Self::ClosePatch(_) => "ClosePatch",
            Self::AudioStatus { .. } => "AudioStatus",
            Self::Volume(_) => "Volume",
            Self::Dsp(_) => "DSP",
            Self::SearchPaths(_) => "SearchPaths",
            Self::Console(_) => "Console",
        }
    }

    fn write(&self, w: &mut MessageWriter) {
        w.write_str(self.selector());
        match self {
            Self::Ping | Self::Quit => {}
            Self::OpenPatch(path) => {
                w.write_str(path);
            }
            Self::ClosePatch(id) => {
                w.write_str(id);
            }
            Self::AudioStatus {
                inputs,
                outputs,
                device_state,
            } => {
                w.write_i32(*inputs).write_i32(*outputs).write_str(device_state);
            }
            Self::Volume(gain) => {
                w.write_f32(*gain);
            }
            Self::Dsp(on) => {
                w.write_bool(*on);
            }
            Self::SearchPaths(paths) => {
                w.write_selection(paths);
            }
            Self::Console(text) => {
                w.write_str(text);
            }
        }
    }

    fn read(r: &mut MessageReader<'_>) -> FrameResult<Self> {
        let selector = r.read_string()?;
        Ok(match selector.as_str() {
            "Ping" => Self::Ping,
            "Quit" => Self::Quit,
            "OpenPatch" => Self::OpenPatch(r.read_string()?),
            "ClosePatch" => Self::ClosePatch(r.read_string()?),
            "AudioStatus" => Self::AudioStatus {
                inputs: r.read_i32()?,
                outputs: r.read_i32()?,
                device_state: r.read_string()?,
            },
            "Volume" => Self::Volume(r.read_f32()?),
            "DSP" => Self::Dsp(r.read_bool()?),
            "SearchPaths" => Self::SearchPaths(r.read_selection()?),
            "Console" => Self::Console(r.read_string()?),
            _ => {
                return Err(FrameError::UnknownSelector {
                    class: "global",
                    selector,
                })
            }
        })
    }
}

impl Connection {
    fn write(&self, w: &mut MessageWriter) {
        w.write_i32(self.outlet)
            .write_str(&self.source)
            .write_i32(self.inlet)
            .write_str(&self.sink);
    }

    fn read(r: &mut MessageReader<'_>) -> FrameResult<Self> {
        Ok(Self {
            outlet: r.read_i32()?,
            source: r.read_string()?,
            inlet: r.read_i32()?,
            sink: r.read_string()?,
        })
    }
}

fn write_flags(w: &mut MessageWriter, flags: &[bool]) {
    w.write_i32(flags.len() as i32);
    for &flag in flags {
        w.write_bool(flag);
    }
}

fn read_flags(r: &mut MessageReader<'_>) -> FrameResult<Vec<bool>> {
    let count = r.read_i32()?.max(0) as usize;
    // Each flag is one byte; a count beyond the frame is truncation
    if count > r.remaining().len() {
        return Err(FrameError::UnexpectedEof {
            offset: r.position(),
            needed: count - r.remaining().len(),
        });
    }
    (0..count).map(|_| r.read_bool()).collect()
}

impl SyncItem {
    fn write(&self, w: &mut MessageWriter) {
        match self {
            Self::Object(object) => {
                w.write_bool(false)
                    .write_str(&object.id)
                    .write_str(&object.name)
                    .write_i32(object.x)
                    .write_i32(object.y)
                    .write_i32(object.width)
                    .write_i32(object.height);
                write_flags(w, &object.inlets);
                write_flags(w, &object.outlets);
            }
            Self::Connection(connection) => {
                w.write_bool(true);
                connection.write(w);
            }
        }
    }

    fn read(r: &mut MessageReader<'_>) -> FrameResult<Self> {
        if r.read_bool()? {
            return Ok(Self::Connection(Connection::read(r)?));
        }
        Ok(Self::Object(ObjectState {
            id: r.read_string()?,
            name: r.read_string()?,
            x: r.read_i32()?,
            y: r.read_i32()?,
            width: r.read_i32()?,
            height: r.read_i32()?,
            inlets: read_flags(r)?,
            outlets: read_flags(r)?,
        }))
    }
}

impl PatchMessage {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::CreateObject(_) => "CreateObject",
            Self::RenameObject { .. } => "RenameObject",
            Self::RemoveSelection(_) => "RemoveSelection",
            Self::MoveSelection { .. } => "MoveSelection",
            Self::CreateConnection(_) => "CreateConnection",
            Self::RemoveConnection(_) => "RemoveConnection",
            Self::Copy(_) => "Copy",
            Self::Paste => "Paste",
            Self::Duplicate(_) => "Duplicate",
            Self::Undo => "Undo",
            Self::Redo => "Redo",
            Self::Encapsulate => "Encapsulate",
            Self::RequestSync => "RequestSync",
            Self::Sync(_) => "Sync",
            Self::Select(_) => "Select",
        }
    }

    fn write(&self, w: &mut MessageWriter) {
        w.write_str(self.selector());
        match self {
            Self::CreateObject(text) => {
                w.write_str(text);
            }
            Self::RenameObject { object_id, name } => {
                w.write_str(object_id).write_str(name);
            }
            Self::RemoveSelection(ids)
            | Self::Copy(ids)
            | Self::Duplicate(ids)
            | Self::Select(ids) => {
                w.write_selection(ids);
            }
            Self::MoveSelection { dx, dy, selection } => {
                w.write_i32(*dx).write_i32(*dy).write_selection(selection);
            }
            Self::CreateConnection(connection) | Self::RemoveConnection(connection) => {
                connection.write(w);
            }
            Self::Sync(items) => {
                for item in items {
                    item.write(w);
                }
            }
            Self::Paste | Self::Undo | Self::Redo | Self::Encapsulate | Self::RequestSync => {}
        }
    }

    fn read(r: &mut MessageReader<'_>) -> FrameResult<Self> {
        let selector = r.read_string()?;
        Ok(match selector.as_str() {
            "CreateObject" => Self::CreateObject(r.read_string()?),
            "RenameObject" => Self::RenameObject {
                object_id: r.read_string()?,
                name: r.read_string()?,
            },
            "RemoveSelection" => Self::RemoveSelection(r.read_selection()?),
            "MoveSelection" => Self::MoveSelection {
                dx: r.read_i32()?,
                dy: r.read_i32()?,
                selection: r.read_selection()?,
            },
            "CreateConnection" => Self::CreateConnection(Connection::read(r)?),
            "RemoveConnection" => Self::RemoveConnection(Connection::read(r)?),
            "Copy" => Self::Copy(r.read_selection()?),
            "Paste" => Self::Paste,
            "Duplicate" => Self::Duplicate(r.read_selection()?),
            "Undo" => Self::Undo,
            "Redo" => Self::Redo,
            "Encapsulate" => Self::Encapsulate,
            "RequestSync" => Self::RequestSync,
            "Sync" => {
                // Items run to the end of the frame
                let mut items = Vec::new();
                while !r.is_exhausted() {
                    items.push(SyncItem::read(r)?);
                }
                Self::Sync(items)
            }
            "Select" => Self::Select(r.read_selection()?),
            _ => {
                return Err(FrameError::UnknownSelector {
                    class: "patch",
                    selector,
                })
            }
        })
    }
}

impl ObjectMessage {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::SetText(_) => "SetText",
            Self::SetWidth(_) => "SetWidth",
            Self::RequestSync => "RequestSync",
        }
    }

    fn write(&self, w: &mut MessageWriter) {
        w.write_str(self.selector());
        match self {
            Self::SetText(text) => {
                w.write_str(text);
            }
            Self::SetWidth(width) => {
                w.write_i32(*width);
            }
            Self::RequestSync => {}
        }
    }

    fn read(r: &mut MessageReader<'_>) -> FrameResult<Self> {
        let selector = r.read_string()?;
        Ok(match selector.as_str() {
            "SetText" => Self::SetText(r.read_string()?),
            "SetWidth" => Self::SetWidth(r.read_i32()?),
            "RequestSync" => Self::RequestSync,
            _ => {
                return Err(FrameError::UnknownSelector {
                    class: "object",
                    selector,
                })
            }
        })
    }
}
