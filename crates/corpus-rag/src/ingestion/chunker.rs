//! Fixed-window text chunking with overlap
//!
//! Sizes are counted in grapheme clusters so a chunk boundary never splits a
//! user-perceived character.

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Document, Node};

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    /// Chunk size in graphemes
    chunk_size: usize,
    /// Overlap between consecutive chunks in graphemes
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker, rejecting `overlap >= chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(Error::invalid_config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily chunk a document. Each call starts over and mints new node ids.
    pub fn chunk<'a>(&self, doc: &'a Document) -> NodeIter<'a> {
        let mut bounds: Vec<usize> = doc
            .content
            .grapheme_indices(true)
            .map(|(offset, _)| offset)
            .collect();
        bounds.push(doc.content.len());

        NodeIter {
            doc,
            bounds,
            chunk_size: self.chunk_size,
            stride: self.chunk_size - self.overlap,
            pos: 0,
            index: 0,
            done: false,
        }
    }

    /// Chunk a document and chain the resulting nodes in order
    pub fn chunk_document(&self, doc: &Document) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.chunk(doc).collect();
        link_nodes(&mut nodes);
        nodes
    }
}

/// Iterator over the nodes of one document
pub struct NodeIter<'a> {
    doc: &'a Document,
    /// Byte offset of every grapheme start, plus the content length
    bounds: Vec<usize>,
    chunk_size: usize,
    stride: usize,
    /// Grapheme index of the next chunk start
    pos: usize,
    index: u32,
    done: bool,
}

impl NodeIter<'_> {
    fn graphemes(&self) -> usize {
        self.bounds.len() - 1
    }
}

impl Iterator for NodeIter<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        if self.done {
            return None;
        }

        let total = self.graphemes();
        let start = self.pos;
        let end = (start + self.chunk_size).min(total);
        let text = self.doc.content[self.bounds[start]..self.bounds[end]].to_string();
        let node = Node::new(self.doc, text, self.index, start);

        if end >= total {
            self.done = true;
        } else {
            self.pos += self.stride;
            self.index += 1;
        }

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.graphemes().saturating_sub(self.pos);
        let count = if remaining <= self.chunk_size {
            1
        } else {
            1 + (remaining - self.chunk_size).div_ceil(self.stride)
        };
        (count, Some(count))
    }
}

/// Chain nodes of one document through `prev_id`/`next_id` in slice order
pub fn link_nodes(nodes: &mut [Node]) {
    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    for (i, node) in nodes.iter_mut().enumerate() {
        node.prev_id = if i > 0 { Some(ids[i - 1].clone()) } else { None };
        node.next_id = ids.get(i + 1).cloned();
    }
}
