//! Parser for textual graph descriptions such as
//! `appsrc name=src ! other/tensor,dimension=4,type=uint8 ! tensor_sink name=sink`.

use anyhow::{anyhow, bail, Result};

/// One declared element with its raw `key=value` properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    pub type_name: String,
    pub props: Vec<(String, String)>,
}

impl ElementDecl {
    pub fn name(&self) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
    }
}

/// Element referenced by a link.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementRef {
    /// Index into [`Description::elements`].
    Index(usize),
    /// `name.` or `name.pad` reference, resolved after parsing.
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub element: ElementRef,
    pub pad: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkDecl {
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub elements: Vec<ElementDecl>,
    pub links: Vec<LinkDecl>,
}

/// Type name given to inline caps filters.
pub const CAPSFILTER: &str = "capsfilter";

fn tokenize(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => quote = Some(c),
                '!' => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    tokens.push("!".to_string());
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if quote.is_some() {
        bail!("unterminated quote in description");
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn is_caps(token: &str) -> bool {
    let media = token.split(',').next().unwrap_or("");
    media == "ANY" || (media.contains('/') && !media.contains('='))
}

fn is_reference(token: &str) -> bool {
    !token.contains('=') && token.contains('.')
}

fn link_to(desc: &mut Description, prev: &Option<Endpoint>, to: Endpoint) -> Result<()> {
    let from = prev
        .clone()
        .ok_or_else(|| anyhow!("link has no upstream element"))?;
    desc.links.push(LinkDecl { from, to });
    Ok(())
}

pub fn parse(text: &str) -> Result<Description> {
    let mut desc = Description::default();
    // Endpoint the next `!` links from.
    let mut prev: Option<Endpoint> = None;
    // Element that still accepts `key=value` tokens.
    let mut current: Option<usize> = None;
    let mut pending_link = false;

    for token in tokenize(text)? {
        if token == "!" {
            if prev.is_none() || pending_link {
                bail!("unexpected '!'");
            }
            pending_link = true;
            current = None;
            continue;
        }

        if is_caps(&token) {
            desc.elements.push(ElementDecl {
                type_name: CAPSFILTER.to_string(),
                props: vec![("caps".to_string(), token.clone())],
            });
            let idx = desc.elements.len() - 1;
            let here = Endpoint {
                element: ElementRef::Index(idx),
                pad: None,
            };
            if pending_link {
                link_to(&mut desc, &prev, here.clone())?;
                pending_link = false;
            }
            prev = Some(here);
            current = None;
            continue;
        }

        if let Some((key, value)) = token.split_once('=') {
            if pending_link {
                bail!("property '{}' where an element was expected", key);
            }
            let idx = current.ok_or_else(|| anyhow!("property '{}' without an element", key))?;
            if key.is_empty() {
                bail!("property with an empty name");
            }
            desc.elements[idx]
                .props
                .push((key.to_string(), value.to_string()));
            continue;
        }

        if is_reference(&token) {
            let (name, pad) = token
                .split_once('.')
                .ok_or_else(|| anyhow!("bad reference '{}'", token))?;
            if name.is_empty() {
                bail!("reference '{}' has no element name", token);
            }
            let pad = (!pad.is_empty()).then(|| pad.to_string());
            let here = Endpoint {
                element: ElementRef::Named(name.to_string()),
                pad,
            };
            if pending_link {
                link_to(&mut desc, &prev, here.clone())?;
                pending_link = false;
                // A chain may continue out of a reference, from any pad.
                prev = Some(Endpoint {
                    element: here.element,
                    pad: None,
                });
            } else {
                prev = Some(here);
            }
            current = None;
            continue;
        }

        desc.elements.push(ElementDecl {
            type_name: token,
            props: Vec::new(),
        });
        let idx = desc.elements.len() - 1;
        let here = Endpoint {
            element: ElementRef::Index(idx),
            pad: None,
        };
        if pending_link {
            link_to(&mut desc, &prev, here.clone())?;
            pending_link = false;
        }
        prev = Some(here);
        current = Some(idx);
    }

    if pending_link {
        bail!("description ends with '!'");
    }
    if desc.elements.is_empty() {
        bail!("description declares no element");
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_chain() {
        let desc = parse("videotestsrc num-buffers=2 ! fakesink").unwrap();
        assert_eq!(desc.elements.len(), 2);
        assert_eq!(desc.elements[0].type_name, "videotestsrc");
        assert_eq!(desc.elements[0].props, vec![("num-buffers".into(), "2".into())]);
        assert_eq!(desc.links.len(), 1);
        assert_eq!(desc.links[0].from.element, ElementRef::Index(0));
        assert_eq!(desc.links[0].to.element, ElementRef::Index(1));
    }

    #[test]
    fn test_caps_and_quotes() {
        let desc = parse(
            "appsrc name=srcx caps='other/tensor,dimension=(string)4:1:1:1' ! \
             other/tensors,format=flexible ! filesink location=\"/tmp/a b\"",
        )
        .unwrap();
        assert_eq!(desc.elements.len(), 3);
        assert_eq!(desc.elements[0].name(), Some("srcx"));
        assert_eq!(desc.elements[0].props[1].1, "other/tensor,dimension=(string)4:1:1:1");
        assert_eq!(desc.elements[1].type_name, CAPSFILTER);
        assert_eq!(desc.elements[2].props[0].1, "/tmp/a b");
    }

    #[test]
    fn test_named_branches() {
        let desc = parse(
            "videotestsrc ! tee name=t t. ! queue ! fakesink t. ! queue ! ins.sink_1 \
             input-selector name=ins ! fakesink",
        )
        .unwrap();
        let from_t: Vec<_> = desc
            .links
            .iter()
            .filter(|l| l.from.element == ElementRef::Named("t".into()))
            .collect();
        assert_eq!(from_t.len(), 2);
        let into_ins = desc
            .links
            .iter()
            .find(|l| l.to.element == ElementRef::Named("ins".into()))
            .unwrap();
        assert_eq!(into_ins.to.pad.as_deref(), Some("sink_1"));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("! fakesink").is_err());
        assert!(parse("videotestsrc !").is_err());
        assert!(parse("videotestsrc ! ! fakesink").is_err());
        assert!(parse("num-buffers=3").is_err());
        assert!(parse("appsrc caps='other/tensor").is_err());
        assert!(parse("   ").is_err());
    }
}
