//! Turns a parsed description into elements, links and negotiated caps.

use super::description::{self, ElementRef, CAPSFILTER};
use crate::config::PipelineConfig;
use crate::core::{Caps, Element, ProcessingNode};
use crate::observability::NodeMetrics;
use crate::registry::{find_element, ElementMetadata, PadTemplate};
use crate::resilience::ResilientNode;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Elements a source looks through when searching for the caps filter
/// that fixes its output.
const TRANSPARENT: &[&str] = &["videoconvert", "queue"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub src: usize,
    pub src_pad: usize,
    pub sink: usize,
    pub sink_pad: usize,
}

pub struct Graph {
    pub elements: Vec<Arc<Element>>,
    pub nodes: Vec<Box<dyn ProcessingNode>>,
    pub metrics: Vec<Arc<NodeMetrics>>,
    pub links: Vec<Link>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    Src,
    Sink,
}

struct PadPicker {
    linked: HashSet<(usize, Direction, usize)>,
}

impl PadPicker {
    fn pick(
        &mut self,
        index: usize,
        element: &Element,
        template: PadTemplate,
        dir: Direction,
        wanted: Option<&str>,
    ) -> Result<usize> {
        let pads = match dir {
            Direction::Src => element.src_pads(),
            Direction::Sink => element.sink_pads(),
        };
        let add = |name: String| match dir {
            Direction::Src => element.add_src_pad(name),
            Direction::Sink => element.add_sink_pad(name),
        };

        let pad = match wanted {
            Some(name) => match pads.iter().position(|p| p == name) {
                Some(i) if self.linked.contains(&(index, dir, i)) => {
                    bail!("pad '{}.{}' is already linked", element.name(), name)
                }
                Some(i) => i,
                None => match template {
                    PadTemplate::Request(prefix) if name.starts_with(prefix) => add(name.to_string()),
                    _ => bail!("element '{}' has no pad '{}'", element.name(), name),
                },
            },
            None => match (0..pads.len()).find(|i| !self.linked.contains(&(index, dir, *i))) {
                Some(i) => i,
                None => match template {
                    PadTemplate::Request(prefix) => {
                        let name = (0..)
                            .map(|n| format!("{}{}", prefix, n))
                            .find(|candidate| !pads.contains(candidate))
                            .unwrap_or_else(|| format!("{}{}", prefix, pads.len()));
                        add(name)
                    }
                    _ => bail!("element '{}' has no free pad to link", element.name()),
                },
            },
        };
        self.linked.insert((index, dir, pad));
        Ok(pad)
    }
}

impl Graph {
    /// Build and negotiate the graph of `text`.
    pub fn build(text: &str, config: &PipelineConfig) -> Result<Self> {
        let desc = description::parse(text)?;

        let mut elements: Vec<Arc<Element>> = Vec::with_capacity(desc.elements.len());
        let mut metas: Vec<ElementMetadata> = Vec::with_capacity(desc.elements.len());
        let mut counters: HashMap<&str, usize> = HashMap::new();

        for decl in &desc.elements {
            let meta = find_element(&decl.type_name)
                .ok_or_else(|| anyhow!("no element type named '{}'", decl.type_name))?;
            let name = match decl.name() {
                Some(n) => n.to_string(),
                None => {
                    let n = counters.entry(meta.type_name).or_insert(0);
                    let name = format!("{}{}", meta.type_name, n);
                    *n += 1;
                    name
                }
            };
            if elements.iter().any(|e| e.name() == name) {
                bail!("element name '{}' is used twice", name);
            }
            let element = Element::new(name, &meta);
            for (key, value) in decl.props.iter().filter(|(k, _)| k != "name") {
                element
                    .props()
                    .set_from_str(key, value)
                    .with_context(|| format!("element '{}'", element.name()))?;
            }
            elements.push(Arc::new(element));
            metas.push(meta);
        }

        let index_of = |r: &ElementRef| -> Result<usize> {
            match r {
                ElementRef::Index(i) => Ok(*i),
                ElementRef::Named(name) => elements
                    .iter()
                    .position(|e| e.name() == name)
                    .ok_or_else(|| anyhow!("no element named '{}'", name)),
            }
        };

        let mut picker = PadPicker { linked: HashSet::new() };
        let mut links = Vec::with_capacity(desc.links.len());
        for decl in &desc.links {
            let src = index_of(&decl.from.element)?;
            let sink = index_of(&decl.to.element)?;
            if src == sink {
                bail!("element '{}' is linked to itself", elements[src].name());
            }
            let src_pad = picker.pick(src, &elements[src], metas[src].src_pads, Direction::Src, decl.from.pad.as_deref())?;
            let sink_pad =
                picker.pick(sink, &elements[sink], metas[sink].sink_pads, Direction::Sink, decl.to.pad.as_deref())?;
            links.push(Link {
                src,
                src_pad,
                sink,
                sink_pad,
            });
        }

        let order = topological_order(elements.len(), &links)?;

        let mut nodes = Vec::with_capacity(elements.len());
        let mut metrics = Vec::with_capacity(elements.len());
        for (element, meta) in elements.iter().zip(&metas) {
            let node_metrics = Arc::new(NodeMetrics::new(element.name()));
            let mut node: Box<dyn ProcessingNode> =
                Box::new(ResilientNode::new(meta.create_instance(), Arc::clone(&node_metrics)));
            node.on_create(element, config)
                .with_context(|| format!("cannot create element '{}'", element.name()))?;
            nodes.push(node);
            metrics.push(node_metrics);
        }

        let mut graph = Graph {
            elements,
            nodes,
            metrics,
            links,
        };
        graph.negotiate(&order)?;
        debug!(elements = graph.elements.len(), links = graph.links.len(), "graph built");
        Ok(graph)
    }

    fn negotiate(&mut self, order: &[usize]) -> Result<()> {
        for &i in order {
            let mut incoming: Vec<&Link> = self.links.iter().filter(|l| l.sink == i).collect();
            incoming.sort_by_key(|l| l.sink_pad);
            let inputs: Vec<Caps> = incoming.iter().map(|l| self.elements[l.src].caps()).collect();

            let hint = if self.nodes[i].is_source() {
                self.source_hint(i)?
            } else {
                None
            };
            let element = &self.elements[i];
            let caps = self.nodes[i]
                .negotiate(element, &inputs, hint.as_ref())
                .with_context(|| format!("caps negotiation failed at '{}'", element.name()))?;
            debug!(element = %element.name(), caps = %caps, "negotiated");
            element.set_caps(caps);
        }
        Ok(())
    }

    /// The caps filter right after a source, looking through transparent
    /// elements.
    fn source_hint(&self, source: usize) -> Result<Option<Caps>> {
        let mut at = source;
        loop {
            let Some(next) = self.links.iter().find(|l| l.src == at).map(|l| l.sink) else {
                return Ok(None);
            };
            let element = &self.elements[next];
            if element.type_name() == CAPSFILTER {
                return Ok(Some(Caps::parse(&element.props().string("caps"))?));
            }
            if !TRANSPARENT.contains(&element.type_name()) {
                return Ok(None);
            }
            at = next;
        }
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Element>> {
        self.elements.iter().find(|e| e.name() == name)
    }
}

fn topological_order(count: usize, links: &[Link]) -> Result<Vec<usize>> {
    let mut indegree = vec![0usize; count];
    for l in links {
        indegree[l.sink] += 1;
    }
    let mut ready: VecDeque<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for l in links.iter().filter(|l| l.src == i) {
            indegree[l.sink] -= 1;
            if indegree[l.sink] == 0 {
                ready.push_back(l.sink);
            }
        }
    }
    if order.len() != count {
        bail!("graph contains a loop");
    }
    Ok(order)
}
