//! Typed reveal of a finished answer.
//!
//! The answer is fully known before the animation starts; the renderer only
//! controls disclosure. It walks the parsed node tree depth-first and
//! reveals each text leaf in character chunks sized by the leaf's length, so
//! total reveal time stays roughly bounded regardless of answer length.
//! Element structure is present in every frame; only text grows.
//!
//! Disposal (unmount, superseded answer) stops the ticks and synchronously
//! forces the surface to the full final content. A partially revealed frame
//! is never left visible, and the completion callback fires exactly once,
//! only on natural completion.

use crate::config::RevealConfig;
use crate::markup::{Document, Node};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Live output surface the reveal writes frames into.
pub trait OutputSurface: Send + Sync {
    /// Replace the surface's content with the given markup.
    fn set_content(&self, markup: &str);
}

/// Characters revealed per tick for a text leaf of `len` characters.
///
/// Longer leaves reveal in larger chunks so perceived typing speed stays
/// roughly constant across short and long answers.
fn chunk_for(len: usize) -> usize {
    if len > 800 {
        6
    } else if len > 400 {
        4
    } else if len > 200 {
        3
    } else {
        2
    }
}

/// Options for one reveal run.
pub struct RevealOptions {
    animate: bool,
    tick: Duration,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl RevealOptions {
    /// Animated reveal at the default tick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            animate: true,
            tick: Duration::from_millis(RevealConfig::default().tick_ms),
            on_complete: None,
        }
    }

    /// Build options from configuration.
    #[must_use]
    pub fn from_config(config: &RevealConfig) -> Self {
        Self::new()
            .with_animate(config.enabled)
            .with_tick(Duration::from_millis(config.tick_ms))
    }

    /// Enable or disable animation. Disabled runs write the full content in
    /// one step.
    #[must_use]
    pub fn with_animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    /// Set the tick interval.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Set the callback fired exactly once on natural completion.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl Default for RevealOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct RevealShared {
    surface: Arc<dyn OutputSurface>,
    full: String,
    cancel: CancellationToken,
    /// Set once, by whichever of completion or disposal happens first.
    settled: AtomicBool,
    /// Serializes surface writes so a disposal flush cannot be overwritten
    /// by an in-flight tick frame.
    gate: Mutex<()>,
}

/// Disposer handle for a running reveal.
pub struct RevealHandle {
    shared: Arc<RevealShared>,
}

impl RevealHandle {
    /// Stop the animation and synchronously force the surface to the full
    /// final content. Idempotent; a no-op after natural completion.
    pub fn dispose(&self) {
        if self.shared.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();
        let _gate = self
            .shared
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.surface.set_content(&self.shared.full);
        debug!("reveal disposed, surface flushed to full content");
    }

    /// Whether the reveal has settled (completed or been disposed).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.settled.load(Ordering::SeqCst)
    }
}

/// Start revealing `document` into `surface`.
///
/// Returns a disposer handle. With animation disabled (or nothing to
/// animate) the full content is written immediately, the completion callback
/// fires, and the handle is a no-op.
pub fn reveal(
    document: Document,
    surface: Arc<dyn OutputSurface>,
    options: RevealOptions,
) -> RevealHandle {
    let full = document.to_markup();
    let leaves = leaf_lengths(&document);
    let shared = Arc::new(RevealShared {
        surface,
        full,
        cancel: CancellationToken::new(),
        settled: AtomicBool::new(false),
        gate: Mutex::new(()),
    });
    let handle = RevealHandle {
        shared: shared.clone(),
    };

    let mut on_complete = options.on_complete;
    if !options.animate || leaves.iter().all(|len| *len == 0) {
        shared.settled.store(true, Ordering::SeqCst);
        shared.surface.set_content(&shared.full);
        if let Some(callback) = on_complete.take() {
            callback();
        }
        return handle;
    }

    let tick = options.tick;
    tokio::spawn(async move {
        let mut cursor = Cursor::default();
        loop {
            tokio::select! {
                () = shared.cancel.cancelled() => return,
                () = tokio::time::sleep(tick) => {}
            }

            if cursor.advance(&leaves) {
                // Last leaf fully revealed: settle with the full content.
                if !shared.settled.swap(true, Ordering::SeqCst) {
                    {
                        let _gate = shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
                        shared.surface.set_content(&shared.full);
                    }
                    if let Some(callback) = on_complete.take() {
                        callback();
                    }
                }
                return;
            }

            let frame = partial_document(&document, &cursor).to_markup();
            let _gate = shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.settled.load(Ordering::SeqCst) {
                return;
            }
            shared.surface.set_content(&frame);
        }
    });

    handle
}

/// Cursor over the document's text leaves in depth-first order.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    leaf: usize,
    chars: usize,
}

impl Cursor {
    /// Advance by one tick's chunk. Returns true once every leaf is fully
    /// revealed.
    fn advance(&mut self, leaves: &[usize]) -> bool {
        while self.leaf < leaves.len() && leaves[self.leaf] == 0 {
            self.leaf += 1;
        }
        if self.leaf >= leaves.len() {
            return true;
        }
        let len = leaves[self.leaf];
        self.chars += chunk_for(len);
        if self.chars >= len {
            self.leaf += 1;
            self.chars = 0;
        }
        self.leaf >= leaves.len()
    }
}

/// Character count of every text leaf, depth-first.
fn leaf_lengths(document: &Document) -> Vec<usize> {
    fn walk(node: &Node, out: &mut Vec<usize>) {
        match node {
            Node::Text(text) => out.push(text.chars().count()),
            Node::Element { children, .. } => {
                for child in children {
                    walk(child, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    for node in &document.nodes {
        walk(node, &mut out);
    }
    out
}

/// Clone the document with the element structure intact and text leaves cut
/// at the cursor: earlier leaves full, the current leaf a prefix, later
/// leaves empty.
fn partial_document(document: &Document, cursor: &Cursor) -> Document {
    fn cut(node: &Node, cursor: &Cursor, leaf_index: &mut usize) -> Node {
        match node {
            Node::Text(text) => {
                let index = *leaf_index;
                *leaf_index += 1;
                let shown = if index < cursor.leaf {
                    text.clone()
                } else if index == cursor.leaf {
                    text.chars().take(cursor.chars).collect()
                } else {
                    String::new()
                };
                Node::Text(shown)
            }
            Node::Element {
                tag,
                attrs,
                children,
            } => Node::Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
                children: children
                    .iter()
                    .map(|child| cut(child, cursor, leaf_index))
                    .collect(),
            },
        }
    }

    let mut leaf_index = 0;
    Document {
        nodes: document
            .nodes
            .iter()
            .map(|node| cut(node, cursor, &mut leaf_index))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::mpsc;

    /// Records every frame written to it.
    #[derive(Default)]
    struct FrameLog {
        frames: Mutex<Vec<String>>,
    }

    impl FrameLog {
        fn frames(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn last(&self) -> String {
            self.frames().last().cloned().unwrap_or_default()
        }
    }

    impl OutputSurface for FrameLog {
        fn set_content(&self, markup: &str) {
            self.frames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(markup.to_owned());
        }
    }

    fn fast() -> RevealOptions {
        RevealOptions::new().with_tick(Duration::from_millis(1))
    }

    // ── Chunk bands ─────────────────────────────────────────────────────

    #[test]
    fn chunk_bands_match_length() {
        assert_eq!(chunk_for(900), 6);
        assert_eq!(chunk_for(801), 6);
        assert_eq!(chunk_for(800), 4);
        assert_eq!(chunk_for(401), 4);
        assert_eq!(chunk_for(400), 3);
        assert_eq!(chunk_for(201), 3);
        assert_eq!(chunk_for(200), 2);
        assert_eq!(chunk_for(1), 2);
    }

    // ── Disabled animation ──────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_animation_writes_full_immediately() {
        let surface = Arc::new(FrameLog::default());
        let (done_tx, done_rx) = mpsc::channel();
        let doc = Document::parse("<p>Hello world</p>");

        let handle = reveal(
            doc,
            surface.clone(),
            fast()
                .with_animate(false)
                .on_complete(move || done_tx.send(()).unwrap()),
        );

        assert!(handle.is_settled());
        done_rx.recv().unwrap();
        assert_eq!(surface.frames(), vec!["<p>Hello world</p>".to_owned()]);

        // Disposer is a no-op afterwards.
        handle.dispose();
        assert_eq!(surface.frames().len(), 1);
    }

    // ── Natural completion ──────────────────────────────────────────────

    #[tokio::test]
    async fn animated_reveal_converges_to_full_content() {
        let surface = Arc::new(FrameLog::default());
        let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
        let doc = Document::parse("<p>Hello <strong>brave</strong> world</p>");
        let full = doc.to_markup();

        let _handle = reveal(
            doc,
            surface.clone(),
            fast().on_complete(move || {
                let _ = done_tx.try_send(());
            }),
        );

        done_rx.recv().await.unwrap();
        assert_eq!(surface.last(), full);

        // Frames grow monotonically: each is at least as long as the last.
        let frames = surface.frames();
        assert!(frames.len() > 1, "expected several frames");
        for pair in frames.windows(2) {
            assert!(pair[1].len() >= pair[0].len());
        }
    }

    #[tokio::test]
    async fn structure_is_present_in_every_frame() {
        let surface = Arc::new(FrameLog::default());
        let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
        let doc = Document::parse("<p>ab<em>cd</em>ef</p>");

        let _handle = reveal(
            doc,
            surface.clone(),
            fast().on_complete(move || {
                let _ = done_tx.try_send(());
            }),
        );
        done_rx.recv().await.unwrap();

        for frame in surface.frames() {
            assert!(frame.starts_with("<p>"), "frame missing structure: {frame}");
            assert!(frame.contains("<em>"), "frame missing structure: {frame}");
        }
    }

    #[tokio::test]
    async fn completion_fires_exactly_once() {
        let surface = Arc::new(FrameLog::default());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_in = count.clone();
        let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);

        let handle = reveal(
            Document::parse("<p>short</p>"),
            surface,
            fast().on_complete(move || {
                count_in.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.try_send(());
            }),
        );
        done_rx.recv().await.unwrap();

        // Disposing after completion is a safe no-op and must not re-fire.
        handle.dispose();
        handle.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // ── Disposal ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispose_flushes_full_content_synchronously() {
        let surface = Arc::new(FrameLog::default());
        let long = format!("<p>{}</p>", "x".repeat(2000));
        let doc = Document::parse(&long);
        let full = doc.to_markup();

        let handle = reveal(doc, surface.clone(), fast());
        // Let a few ticks land, then cancel mid-reveal.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.dispose();

        // The flush happens inside dispose, not on some later tick.
        assert_eq!(surface.last(), full);
        assert!(handle.is_settled());

        // No frame may arrive after the flush.
        let frames_at_dispose = surface.frames().len();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(surface.frames().len(), frames_at_dispose);

        handle.dispose();
    }

    #[tokio::test]
    async fn empty_document_completes_without_frames_to_animate() {
        let surface = Arc::new(FrameLog::default());
        let (done_tx, done_rx) = mpsc::channel();

        let handle = reveal(
            Document::parse(""),
            surface.clone(),
            fast().on_complete(move || done_tx.send(()).unwrap()),
        );

        assert!(handle.is_settled());
        done_rx.recv().unwrap();
        assert_eq!(surface.last(), "");
    }
}
