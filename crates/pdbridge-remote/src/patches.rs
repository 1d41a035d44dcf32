//! Patch interpreter boundary and the headless default runtime

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pdbridge_core::engine::BlockRenderer;
use pdbridge_core::protocol::{Connection, ObjectMessage, ObjectState, PatchMessage, SyncItem};
use pdbridge_core::{AudioBlock, MidiBuffer};

use crate::error::{RemoteError, RemoteResult};

/// What the engine needs from a patch interpreter besides rendering audio
pub trait PatchHost {
    /// Open a patch file and return its id
    fn open_patch(&mut self, path: &Path) -> RemoteResult<String>;

    fn close_patch(&mut self, patch_id: &str) -> RemoteResult<()>;

    /// Replace the abstraction/external search paths
    fn set_search_paths(&mut self, paths: &[PathBuf]) -> RemoteResult<()>;

    fn set_dsp(&mut self, on: bool);

    /// Apply an edit command to a patch
    fn patch_command(&mut self, patch_id: &str, command: &PatchMessage) -> RemoteResult<()>;

    /// Apply a command to one object
    fn object_command(
        &mut self,
        patch_id: &str,
        object_id: &str,
        command: &ObjectMessage,
    ) -> RemoteResult<()>;

    /// Objects then connections of a patch, `None` for unknown ids
    fn snapshot(&self, patch_id: &str) -> Option<Vec<SyncItem>>;

    /// Console fragments printed since the last call
    fn drain_print(&mut self) -> Vec<String>;
}

/// Offset applied to pasted objects so they do not cover the originals
const PASTE_OFFSET: i32 = 10;
/// First id handed out, matching the interpreter's `$0` numbering
const FIRST_ID: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
struct PatchGraph {
    objects: Vec<ObjectState>,
    connections: Vec<Connection>,
}

impl PatchGraph {
    fn object_mut(&mut self, patch_id: &str, object_id: &str) -> RemoteResult<&mut ObjectState> {
        self.objects
            .iter_mut()
            .find(|o| o.id == object_id)
            .ok_or_else(|| RemoteError::UnknownObject {
                patch_id: patch_id.to_string(),
                object_id: object_id.to_string(),
            })
    }

    fn contains(&self, object_id: &str) -> bool {
        self.objects.iter().any(|o| o.id == object_id)
    }

    fn remove(&mut self, selection: &[String]) {
        self.objects.retain(|o| !selection.contains(&o.id));
        self.connections
            .retain(|c| !selection.contains(&c.source) && !selection.contains(&c.sink));
    }
}

#[derive(Debug)]
struct HeadlessPatch {
    path: PathBuf,
    graph: PatchGraph,
    undo: Vec<PatchGraph>,
    redo: Vec<PatchGraph>,
}

impl HeadlessPatch {
    /// Record the current graph before an edit
    fn checkpoint(&mut self) {
        self.undo.push(self.graph.clone());
        self.redo.clear();
    }
}

/// Runtime without an interpreter
///
/// Audio passes straight through and MIDI is swallowed. Patches and edits
/// are kept in memory so the editor protocol works end to end without libpd.
#[derive(Debug)]
pub struct HeadlessRuntime {
    patches: BTreeMap<String, HeadlessPatch>,
    clipboard: Vec<ObjectState>,
    search_paths: Vec<PathBuf>,
    dsp: bool,
    next_id: u64,
    print: Vec<String>,
}

impl Default for HeadlessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRuntime {
    pub fn new() -> Self {
        Self {
            patches: BTreeMap::new(),
            clipboard: Vec::new(),
            search_paths: Vec::new(),
            dsp: true,
            next_id: FIRST_ID,
            print: Vec::new(),
        }
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn patch_mut(&mut self, patch_id: &str) -> RemoteResult<&mut HeadlessPatch> {
        self.patches
            .get_mut(patch_id)
            .ok_or_else(|| RemoteError::UnknownPatch(patch_id.to_string()))
    }

    fn copy_selection(&mut self, patch_id: &str, selection: &[String]) -> RemoteResult<()> {
        let patch = self.patch_mut(patch_id)?;
        let copied: Vec<ObjectState> = patch
            .graph
            .objects
            .iter()
            .filter(|o| selection.contains(&o.id))
            .cloned()
            .collect();
        self.clipboard = copied;
        Ok(())
    }

    fn paste(&mut self, patch_id: &str) -> RemoteResult<()> {
        let mut pasted = self.clipboard.clone();
        for object in &mut pasted {
            object.id = self.allocate_id();
            object.x += PASTE_OFFSET;
            object.y += PASTE_OFFSET;
        }
        let patch = self.patch_mut(patch_id)?;
        patch.checkpoint();
        patch.graph.objects.extend(pasted);
        Ok(())
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn is_dsp_on(&self) -> bool {
        self.dsp
    }

    pub fn open_patch_count(&self) -> usize {
        self.patches.len()
    }

    /// File a patch was opened from
    pub fn patch_path(&self, patch_id: &str) -> Option<&Path> {
        self.patches.get(patch_id).map(|p| p.path.as_path())
    }
}

impl BlockRenderer for HeadlessRuntime {
    fn render(&mut self, input: &AudioBlock, output: &mut AudioBlock, midi: &mut MidiBuffer) {
        output.copy_from(input);
        // No interpreter, so nothing produces MIDI
        midi.clear();
    }
}

impl PatchHost for HeadlessRuntime {
    fn open_patch(&mut self, path: &Path) -> RemoteResult<String> {
        if !path.is_file() {
            return Err(RemoteError::PatchNotFound(path.to_path_buf()));
        }

        let id = self.allocate_id();
        self.patches.insert(
            id.clone(),
            HeadlessPatch {
                path: path.to_path_buf(),
                graph: PatchGraph::default(),
                undo: Vec::new(),
                redo: Vec::new(),
            },
        );
        self.print.push(format!("opened {}\n", path.display()));
        Ok(id)
    }

    fn close_patch(&mut self, patch_id: &str) -> RemoteResult<()> {
        self.patches
            .remove(patch_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::UnknownPatch(patch_id.to_string()))
    }

    fn set_search_paths(&mut self, paths: &[PathBuf]) -> RemoteResult<()> {
        self.search_paths = paths.to_vec();
        Ok(())
    }

    fn set_dsp(&mut self, on: bool) {
        self.dsp = on;
    }

    fn patch_command(&mut self, patch_id: &str, command: &PatchMessage) -> RemoteResult<()> {
        match command {
            PatchMessage::CreateObject(text) => {
                let id = self.allocate_id();
                let patch = self.patch_mut(patch_id)?;
                patch.checkpoint();
                patch.graph.objects.push(ObjectState {
                    id,
                    name: text.clone(),
                    ..Default::default()
                });
            }
            PatchMessage::RenameObject { object_id, name } => {
                let patch = self.patch_mut(patch_id)?;
                patch.graph.object_mut(patch_id, object_id)?;
                patch.checkpoint();
                patch.graph.object_mut(patch_id, object_id)?.name = name.clone();
            }
            PatchMessage::RemoveSelection(selection) => {
                let patch = self.patch_mut(patch_id)?;
                patch.checkpoint();
                patch.graph.remove(selection);
            }
            PatchMessage::MoveSelection { dx, dy, selection } => {
                let patch = self.patch_mut(patch_id)?;
                patch.checkpoint();
                for object in patch.graph.objects.iter_mut().filter(|o| selection.contains(&o.id)) {
                    object.x += dx;
                    object.y += dy;
                }
            }
            PatchMessage::CreateConnection(connection) => {
                let patch = self.patch_mut(patch_id)?;
                for endpoint in [&connection.source, &connection.sink] {
                    if !patch.graph.contains(endpoint) {
                        return Err(RemoteError::UnknownObject {
                            patch_id: patch_id.to_string(),
                            object_id: endpoint.clone(),
                        });
                    }
                }
                if !patch.graph.connections.contains(connection) {
                    patch.checkpoint();
                    patch.graph.connections.push(connection.clone());
                }
            }
            PatchMessage::RemoveConnection(connection) => {
                let patch = self.patch_mut(patch_id)?;
                patch.checkpoint();
                patch.graph.connections.retain(|c| c != connection);
            }
            PatchMessage::Copy(selection) => self.copy_selection(patch_id, selection)?,
            PatchMessage::Paste => self.paste(patch_id)?,
            PatchMessage::Duplicate(selection) => {
                self.copy_selection(patch_id, selection)?;
                self.paste(patch_id)?;
            }
            PatchMessage::Undo => {
                let patch = self.patch_mut(patch_id)?;
                if let Some(previous) = patch.undo.pop() {
                    let current = std::mem::replace(&mut patch.graph, previous);
                    patch.redo.push(current);
                }
            }
            PatchMessage::Redo => {
                let patch = self.patch_mut(patch_id)?;
                if let Some(next) = patch.redo.pop() {
                    let current = std::mem::replace(&mut patch.graph, next);
                    patch.undo.push(current);
                }
            }
            PatchMessage::Encapsulate => {
                self.patch_mut(patch_id)?;
                log::debug!("Encapsulate is not supported by the headless runtime");
            }
            PatchMessage::RequestSync | PatchMessage::Sync(_) | PatchMessage::Select(_) => {
                self.patch_mut(patch_id)?;
            }
        }
        Ok(())
    }

    fn object_command(
        &mut self,
        patch_id: &str,
        object_id: &str,
        command: &ObjectMessage,
    ) -> RemoteResult<()> {
        let patch = self.patch_mut(patch_id)?;
        let object = patch.graph.object_mut(patch_id, object_id)?;
        match command {
            ObjectMessage::SetText(text) => object.name = text.clone(),
            ObjectMessage::SetWidth(width) => object.width = *width,
            ObjectMessage::RequestSync => {}
        }
        Ok(())
    }

    fn snapshot(&self, patch_id: &str) -> Option<Vec<SyncItem>> {
        let graph = &self.patches.get(patch_id)?.graph;
        let objects = graph.objects.iter().cloned().map(SyncItem::Object);
        let connections = graph.connections.iter().cloned().map(SyncItem::Connection);
        Some(objects.chain(connections).collect())
    }

    fn drain_print(&mut self) -> Vec<String> {
        std::mem::take(&mut self.print)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdbridge_core::MidiMessage;

    fn runtime_with_patch() -> (tempfile::TempDir, HeadlessRuntime, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pd");
        std::fs::write(&path, "#N canvas 0 0 450 300 12;\n").unwrap();
        let mut runtime = HeadlessRuntime::new();
        let id = runtime.open_patch(&path).unwrap();
        (dir, runtime, id)
    }

    fn object_ids(runtime: &HeadlessRuntime, patch_id: &str) -> Vec<String> {
        runtime
            .snapshot(patch_id)
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                SyncItem::Object(object) => Some(object.id),
                SyncItem::Connection(_) => None,
            })
            .collect()
    }

    fn connect(source: &str, sink: &str) -> Connection {
        Connection {
            outlet: 0,
            source: source.to_string(),
            inlet: 0,
            sink: sink.to_string(),
        }
    }

    #[test]
    fn test_open_missing_patch_fails() {
        let mut runtime = HeadlessRuntime::new();
        assert!(matches!(
            runtime.open_patch(Path::new("/definitely/not/here.pd")),
            Err(RemoteError::PatchNotFound(_))
        ));
    }

    #[test]
    fn test_open_prints_and_close_forgets() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        assert_eq!(runtime.open_patch_count(), 1);
        assert!(runtime.drain_print()[0].starts_with("opened "));
        assert!(runtime.drain_print().is_empty());

        runtime.close_patch(&id).unwrap();
        assert!(runtime.snapshot(&id).is_none());
        assert!(matches!(runtime.close_patch(&id), Err(RemoteError::UnknownPatch(_))));
    }

    #[test]
    fn test_edit_commands_update_snapshot() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        runtime.patch_command(&id, &PatchMessage::CreateObject("osc~ 440".into())).unwrap();
        runtime.patch_command(&id, &PatchMessage::CreateObject("dac~".into())).unwrap();
        let ids = object_ids(&runtime, &id);
        assert_eq!(ids.len(), 2);

        runtime
            .patch_command(&id, &PatchMessage::CreateConnection(connect(&ids[0], &ids[1])))
            .unwrap();
        runtime
            .patch_command(
                &id,
                &PatchMessage::MoveSelection {
                    dx: 5,
                    dy: -3,
                    selection: vec![ids[0].clone()],
                },
            )
            .unwrap();

        let snapshot = runtime.snapshot(&id).unwrap();
        assert_eq!(snapshot.len(), 3);
        match &snapshot[0] {
            SyncItem::Object(object) => {
                assert_eq!(object.name, "osc~ 440");
                assert_eq!((object.x, object.y), (5, -3));
            }
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(snapshot[2], SyncItem::Connection(connect(&ids[0], &ids[1])));

        // Removing an object drops its connections
        runtime
            .patch_command(&id, &PatchMessage::RemoveSelection(vec![ids[1].clone()]))
            .unwrap();
        assert_eq!(runtime.snapshot(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_connection_needs_both_endpoints() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        runtime.patch_command(&id, &PatchMessage::CreateObject("f".into())).unwrap();
        let ids = object_ids(&runtime, &id);
        assert!(matches!(
            runtime.patch_command(&id, &PatchMessage::CreateConnection(connect(&ids[0], "999"))),
            Err(RemoteError::UnknownObject { .. })
        ));
    }

    #[test]
    fn test_undo_redo() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        runtime.patch_command(&id, &PatchMessage::CreateObject("a".into())).unwrap();
        runtime.patch_command(&id, &PatchMessage::CreateObject("b".into())).unwrap();

        runtime.patch_command(&id, &PatchMessage::Undo).unwrap();
        assert_eq!(object_ids(&runtime, &id).len(), 1);
        runtime.patch_command(&id, &PatchMessage::Undo).unwrap();
        assert_eq!(object_ids(&runtime, &id).len(), 0);
        runtime.patch_command(&id, &PatchMessage::Undo).unwrap();
        assert_eq!(object_ids(&runtime, &id).len(), 0);

        runtime.patch_command(&id, &PatchMessage::Redo).unwrap();
        assert_eq!(object_ids(&runtime, &id).len(), 1);

        // A new edit clears the redo history
        runtime.patch_command(&id, &PatchMessage::CreateObject("c".into())).unwrap();
        runtime.patch_command(&id, &PatchMessage::Redo).unwrap();
        assert_eq!(object_ids(&runtime, &id).len(), 2);
    }

    #[test]
    fn test_duplicate_offsets_copies() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        runtime.patch_command(&id, &PatchMessage::CreateObject("bang".into())).unwrap();
        let original = object_ids(&runtime, &id);

        runtime.patch_command(&id, &PatchMessage::Duplicate(original.clone())).unwrap();
        let snapshot = runtime.snapshot(&id).unwrap();
        assert_eq!(snapshot.len(), 2);
        match &snapshot[1] {
            SyncItem::Object(copy) => {
                assert_ne!(copy.id, original[0]);
                assert_eq!(copy.name, "bang");
                assert_eq!((copy.x, copy.y), (PASTE_OFFSET, PASTE_OFFSET));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_object_commands() {
        let (_dir, mut runtime, id) = runtime_with_patch();
        runtime.patch_command(&id, &PatchMessage::CreateObject("t b".into())).unwrap();
        let object_id = object_ids(&runtime, &id).remove(0);

        runtime.object_command(&id, &object_id, &ObjectMessage::SetText("t b b".into())).unwrap();
        runtime.object_command(&id, &object_id, &ObjectMessage::SetWidth(12)).unwrap();
        match &runtime.snapshot(&id).unwrap()[0] {
            SyncItem::Object(object) => {
                assert_eq!(object.name, "t b b");
                assert_eq!(object.width, 12);
            }
            other => panic!("expected object, got {other:?}"),
        }

        assert!(matches!(
            runtime.object_command(&id, "nope", &ObjectMessage::RequestSync),
            Err(RemoteError::UnknownObject { .. })
        ));
    }

    #[test]
    fn test_render_passes_audio_through() {
        let mut runtime = HeadlessRuntime::new();
        let input = AudioBlock::from_channels(&[&[0.5, -0.5]]);
        let mut output = AudioBlock::new(1, 2);
        runtime.render(&input, &mut output, &mut MidiBuffer::new());
        assert_eq!(output, input);
    }

    #[test]
    fn test_render_consumes_midi() {
        let mut runtime = HeadlessRuntime::new();
        let input = AudioBlock::new(2, 64);
        let mut output = AudioBlock::new(2, 64);
        let mut midi = MidiBuffer::new();
        midi.add_event(MidiMessage::note_on(0, 60, 100), 5);

        runtime.render(&input, &mut output, &mut midi);
        assert!(midi.is_empty());
    }
}
