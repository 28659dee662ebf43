//! Field substitution, conditional sections, and the filter registry
//! (including cloze deletion). Pure functions over a model + note; no I/O.

pub mod lexer;

use crate::store::entities::{Model, ModelTemplate, ModelType, Note};
use crate::Error;
use fancy_regex::Regex;
use lexer::{Lexer, Token};
use log::warn;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    Question,
    Answer,
}

pub struct Rendered {
    pub front: String,
    pub back: String,
}

type Filter = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Immutable filter registry, built once per render call. The `cloze`
/// filter is only present when the model is a Cloze model, selected per
/// the currently rendered template ordinal.
struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    fn build(model: &Model, ord: i32, side: Side) -> Self {
        let mut filters: HashMap<String, Filter> = HashMap::new();
        filters.insert("text".to_string(), Box::new(|s: &str| strip_html(s)));
        filters.insert("type".to_string(), Box::new(|s: &str| s.to_string()));
        if model.model_type == ModelType::Cloze {
            filters.insert(
                "cloze".to_string(),
                Box::new(move |s: &str| apply_cloze_filter(s, ord, side)),
            );
        }
        Self { filters }
    }

    fn apply(&self, name: &str, content: &str) -> String {
        match self.filters.get(&name.to_ascii_lowercase()) {
            Some(f) => f(content),
            None => {
                warn!("unknown template filter `{name}`; passing content through unchanged");
                content.to_string()
            }
        }
    }
}

/// Builds a case-insensitive field-name -> content map from a note's `flds`,
/// ordered by the model's declared field order.
fn field_map(model: &Model, note: &Note) -> HashMap<String, String> {
    let values: Vec<&str> = note.fields();
    let mut map = HashMap::new();
    for (i, field) in model.fields.iter().enumerate() {
        let value = values.get(i).copied().unwrap_or("");
        map.insert(field.name.to_ascii_lowercase(), value.to_string());
    }
    map
}

fn is_truthy(content: &str) -> bool {
    !strip_html(content).trim().is_empty()
}

fn strip_html(s: &str) -> String {
    let re = Regex::new(r"<[^>]+>").unwrap();
    let mut out = String::new();
    let mut last_end = 0;
    for m in re.find_iter(s).flatten() {
        out.push_str(&s[last_end..m.start()]);
        last_end = m.end();
    }
    out.push_str(&s[last_end..]);
    out
}

/// Expands `{{#Field}}...{{/Field}}` and `{{^Field}}...{{/Field}}` sections
/// in `src` against `fields`, then returns the remaining body with sections
/// resolved (non-recursive pass; run repeatedly by the caller if nested
/// sections of different names are present, since names are matched
/// literally and contiguous ranges never overlap once resolved).
fn expand_sections(src: &str, fields: &HashMap<String, String>) -> String {
    let tokens = Lexer::new(src).tokenize();
    let mut out = String::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Text(range) => {
                out.push_str(&src[range.clone()]);
                i += 1;
            }
            Token::SectionOpen { name } | Token::SectionOpenNegated { name } => {
                let negated = matches!(tokens[i], Token::SectionOpenNegated { .. });
                let field_name = src[name.clone()].to_ascii_lowercase();
                let close_idx = find_matching_close(&tokens, i, &field_name);
                match close_idx {
                    Some(close_idx) => {
                        let body_start = token_end(&tokens[i]);
                        let body_end = token_start(&tokens[close_idx]);
                        let body = &src[body_start..body_end];
                        let truthy = fields.get(&field_name).map(|v| is_truthy(v)).unwrap_or(false);
                        if truthy != negated {
                            out.push_str(&expand_sections(body, fields));
                        }
                        i = close_idx + 1;
                    }
                    None => {
                        // No matching close; treat the opener as inert text.
                        i += 1;
                    }
                }
            }
            Token::SectionClose { .. } => {
                // Unmatched close with no opener; drop it.
                i += 1;
            }
            Token::Reference { .. } => {
                out.push_str(&src[token_range(&tokens[i])]);
                i += 1;
            }
        }
    }
    out
}

fn token_range(t: &Token) -> std::ops::Range<usize> {
    match t {
        Token::Text(r) => r.clone(),
        Token::Reference { expr } => (expr.start - 2)..(expr.end + 2),
        Token::SectionOpen { name } => (name.start - 3)..(name.end + 2),
        Token::SectionOpenNegated { name } => (name.start - 3)..(name.end + 2),
        Token::SectionClose { name } => (name.start - 3)..(name.end + 2),
    }
}

fn token_start(t: &Token) -> usize {
    token_range(t).start
}

fn token_end(t: &Token) -> usize {
    token_range(t).end
}

/// Finds the close token balancing `open_idx`, counting any nested opener
/// (regardless of name) as one level of depth so inner sections pass
/// through untouched for the recursive call over the sliced-out body.
fn find_matching_close(tokens: &[Token], open_idx: usize, _field_name: &str) -> Option<usize> {
    let mut depth = 0;
    for (idx, tok) in tokens.iter().enumerate().skip(open_idx + 1) {
        match tok {
            Token::SectionOpen { .. } | Token::SectionOpenNegated { .. } => depth += 1,
            Token::SectionClose { .. } => {
                if depth == 0 {
                    return Some(idx);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Substitutes `{{Field}}` and `{{filter:Field}}` references. `FrontSide` is
/// left as the literal sentinel string for the caller to splice in.
fn substitute_references(
    src: &str,
    fields: &HashMap<String, String>,
    registry: &FilterRegistry,
) -> String {
    let tokens = Lexer::new(src).tokenize();
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(range) => out.push_str(&src[range]),
            Token::Reference { expr } => {
                let raw = &src[expr.clone()];
                if raw == "FrontSide" {
                    out.push_str(FRONT_SIDE_SENTINEL);
                    continue;
                }
                let (filter_name, field_name) = match raw.split_once(':') {
                    Some((f, rest)) => (Some(f), rest),
                    None => (None, raw),
                };
                let value = fields
                    .get(&field_name.to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_default();
                match filter_name {
                    Some(f) => out.push_str(&registry.apply(f, &value)),
                    None => out.push_str(&value),
                }
            }
            // Sections were already resolved by `expand_sections`.
            Token::SectionOpen { ref name } | Token::SectionOpenNegated { ref name } | Token::SectionClose { ref name } => {
                out.push_str(&src[token_range(&token)]);
                let _ = name;
            }
        }
    }
    out
}

const FRONT_SIDE_SENTINEL: &str = "\u{0}FRONTSIDE\u{0}";

fn apply_cloze_filter(text: &str, ord: i32, side: Side) -> String {
    let re = Regex::new(r"\{\{c(\d+)::((?:(?!\}\}).)*?)(?:::((?:(?!\}\}).)*?))?\}\}").unwrap();
    let target = ord + 1;
    let mut out = String::new();
    let mut last_end = 0;
    for caps in re.captures_iter(text).flatten() {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last_end..whole.start()]);
        let n: i32 = caps.get(1).unwrap().as_str().parse().unwrap_or(0);
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let hint = caps.get(3).map(|m| m.as_str());
        if side == Side::Answer || n != target {
            out.push_str(body);
        } else {
            match hint {
                Some(h) => out.push_str(&format!("[{h}]")),
                None => out.push_str("[...]"),
            }
        }
        last_end = whole.end();
    }
    out.push_str(&text[last_end..]);
    out
}

/// Renders a model/note/template-ordinal triple into question+answer HTML.
/// When the model has no template at `ord`, falls back to the note's raw
/// first two fields rather than failing the render.
pub fn render(model: &Model, note: &Note, ord: i32) -> crate::Result<Rendered> {
    let template = match find_template(model, ord) {
        Ok(template) => template,
        Err(Error::TemplateMissing { .. }) => {
            let values = note.fields();
            return Ok(Rendered {
                front: values.first().copied().unwrap_or_default().to_string(),
                back: values.get(1).copied().unwrap_or_default().to_string(),
            });
        }
        Err(e) => return Err(e),
    };
    let fields = field_map(model, note);

    let question_registry = FilterRegistry::build(model, ord, Side::Question);
    let question_sections = expand_sections(&template.qfmt, &fields);
    let front = substitute_references(&question_sections, &fields, &question_registry);

    let answer_registry = FilterRegistry::build(model, ord, Side::Answer);
    let answer_sections = expand_sections(&template.afmt, &fields);
    let back_raw = substitute_references(&answer_sections, &fields, &answer_registry);
    let back = back_raw.replace(FRONT_SIDE_SENTINEL, &front);

    Ok(Rendered { front, back })
}

fn find_template(model: &Model, ord: i32) -> crate::Result<&ModelTemplate> {
    model
        .templates
        .iter()
        .find(|t| t.ord == ord)
        .ok_or_else(|| {
            warn!("model {} has no template with ord {ord}; falling back to raw fields", model.id);
            Error::TemplateMissing { model_id: model.id, ord }
        })
}

/// Distinct cloze indices (the `N` in `{{cN::...}}`) referenced in `text`,
/// in ascending order, deduplicated. Used by note creation to decide how
/// many cards a Cloze note produces.
pub fn cloze_indices(text: &str) -> Vec<i32> {
    let re = Regex::new(r"\{\{c(\d+)::").unwrap();
    let mut indices: Vec<i32> = re
        .captures_iter(text)
        .flatten()
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}
