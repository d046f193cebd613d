//! Post-order traversal of the Dockerfile AST.

use a3s_dockerfile_core::error::Result;

use crate::ast::{Ast, Node};

/// Visit every node, children before their parent. Halts on the first
/// error and returns it unchanged.
pub fn traverse<F>(nodes: &mut [Node], visit: &mut F) -> Result<()>
where
    F: FnMut(&mut Node) -> Result<()>,
{
    traverse_with_depth(nodes, &mut |node: &mut Node, _depth: usize| visit(node))
}

/// Like [`traverse`], also passing each node's nesting depth (0 for
/// top-level instructions, 1 for an `ONBUILD` trigger).
pub fn traverse_with_depth<F>(nodes: &mut [Node], visit: &mut F) -> Result<()>
where
    F: FnMut(&mut Node, usize) -> Result<()>,
{
    for node in nodes.iter_mut() {
        traverse_node(node, 0, visit)?;
    }
    Ok(())
}

fn traverse_node<F>(node: &mut Node, depth: usize, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut Node, usize) -> Result<()>,
{
    for child in node.children.iter_mut() {
        traverse_node(child, depth + 1, visit)?;
    }
    visit(node, depth)
}

impl Ast {
    /// Post-order traversal over all instructions.
    pub fn traverse<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut Node) -> Result<()>,
    {
        traverse(&mut self.nodes, &mut visit)
    }
}
