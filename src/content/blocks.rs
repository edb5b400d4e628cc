use super::chunks::{split_into_chunks, MAX_TEXT_LENGTH};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

const DEFAULT_CODE_LANGUAGE: &str = "plain text";

static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)]+)\)").expect("valid image regex"));
static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s+(.+)").expect("valid list regex"));
static IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://[^\s]+\.(jpg|jpeg|png|gif|webp|svg)(\?[^\s]*)?").expect("valid image url regex")
});

/// Converts markdown-ish transcript text into Notion block objects.
///
/// Recognised, in priority order per line: fenced code, markdown images,
/// headings, bulleted lists, numbered lists, bare image URLs and paragraphs.
/// An unterminated fence is closed at the end of the input.
pub fn content_to_blocks(content: &str) -> Vec<Value> {
    if content.is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let mut blocks = Vec::new();
    let mut fence: Option<(String, Vec<&str>)> = None;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index].trim_end_matches('\r');
        let stripped = line.trim();

        if let Some(rest) = stripped.strip_prefix("```") {
            match fence.take() {
                Some((language, body)) => blocks.extend(code_blocks(&body, &language)),
                None => fence = Some((rest.trim().to_string(), Vec::new())),
            }
            index += 1;
            continue;
        }

        if let Some((_, body)) = fence.as_mut() {
            body.push(line);
            index += 1;
            continue;
        }

        if let Some(block) = markdown_image(stripped) {
            blocks.push(block);
            index += 1;
            continue;
        }

        if let Some(block) = heading(stripped) {
            blocks.push(block);
            index += 1;
            continue;
        }

        let consumed = bulleted_list(&lines[index..], &mut blocks);
        if consumed > 0 {
            index += consumed;
            continue;
        }

        let consumed = numbered_list(&lines[index..], &mut blocks);
        if consumed > 0 {
            index += consumed;
            continue;
        }

        let mut text = line.to_string();
        if let Some(found) = IMAGE_URL.find(line) {
            blocks.push(external_image(found.as_str(), None));
            let remaining = IMAGE_URL.replace_all(line, "").trim().to_string();
            if remaining.is_empty() {
                index += 1;
                continue;
            }
            text = remaining;
        }

        blocks.extend(paragraph_blocks(&text));
        index += 1;
    }

    if let Some((language, body)) = fence {
        blocks.extend(code_blocks(&body, &language));
    }

    blocks
}

fn code_blocks(body: &[&str], language: &str) -> Vec<Value> {
    let code = body.join("\n");
    if code.is_empty() {
        return Vec::new();
    }

    let chunks = split_into_chunks(&code, MAX_TEXT_LENGTH);
    let captioned = chunks.len() > 1;
    let language = notion_language(language);
    chunks
        .into_iter()
        .enumerate()
        .map(|(position, chunk)| {
            let caption = if captioned {
                vec![text_object(&format!("Part {}", position + 1))]
            } else {
                Vec::new()
            };
            json!({
                "object": "block",
                "type": "code",
                "code": {
                    "rich_text": [text_object(&chunk)],
                    "language": language,
                    "caption": caption,
                }
            })
        })
        .collect()
}

/// Maps common fence shorthands onto the language names Notion accepts.
fn notion_language(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let mapped = match lowered.as_str() {
        "" | "text" | "txt" | "plaintext" => DEFAULT_CODE_LANGUAGE,
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "rs" => "rust",
        "sh" | "zsh" => "shell",
        "yml" => "yaml",
        "md" => "markdown",
        "c++" | "cpp" => "c++",
        "cs" | "csharp" => "c#",
        "golang" => "go",
        "rb" => "ruby",
        other => other,
    };
    mapped.to_string()
}

fn markdown_image(stripped: &str) -> Option<Value> {
    let captures = MARKDOWN_IMAGE.captures(stripped)?;
    let alt = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let url = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let caption = (!alt.is_empty()).then_some(alt);

    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(external_image(url, caption));
    }
    Some(json!({
        "object": "block",
        "type": "image",
        "image": {
            "type": "file",
            "file": { "url": url },
            "caption": caption.map(|text| vec![text_object(text)]).unwrap_or_default(),
        }
    }))
}

fn external_image(url: &str, caption: Option<&str>) -> Value {
    json!({
        "object": "block",
        "type": "image",
        "image": {
            "type": "external",
            "external": { "url": url },
            "caption": caption.map(|text| vec![text_object(text)]).unwrap_or_default(),
        }
    })
}

fn heading(stripped: &str) -> Option<Value> {
    if !stripped.starts_with('#') {
        return None;
    }
    let title = stripped.trim_start_matches('#');
    let level = stripped.len() - title.len();
    let title = title.trim();
    if title.is_empty() {
        return None;
    }

    let kind = format!("heading_{}", level.min(3));
    Some(json!({
        "object": "block",
        "type": kind,
        kind.as_str(): { "rich_text": [text_object(title)] }
    }))
}

fn bulleted_list(lines: &[&str], blocks: &mut Vec<Value>) -> usize {
    let mut consumed = 0;
    for line in lines {
        let stripped = line.trim();
        let Some(item) = stripped.strip_prefix("- ").or_else(|| stripped.strip_prefix("* ")) else {
            break;
        };
        let item = item.trim();
        if !item.is_empty() {
            blocks.extend(list_item_blocks(item, "bulleted_list_item"));
        }
        consumed += 1;
    }
    consumed
}

fn numbered_list(lines: &[&str], blocks: &mut Vec<Value>) -> usize {
    let mut consumed = 0;
    for line in lines {
        let Some(captures) = NUMBERED_ITEM.captures(line.trim()) else {
            break;
        };
        let item = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        blocks.extend(list_item_blocks(item, "numbered_list_item"));
        consumed += 1;
    }
    consumed
}

fn list_item_blocks(item: &str, kind: &str) -> Vec<Value> {
    split_into_chunks(item, MAX_TEXT_LENGTH)
        .into_iter()
        .map(|chunk| {
            json!({
                "object": "block",
                "type": kind,
                kind: { "rich_text": [text_object(&chunk)] }
            })
        })
        .collect()
}

fn paragraph_blocks(line: &str) -> Vec<Value> {
    if line.trim().is_empty() {
        return vec![json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": [] }
        })];
    }

    split_into_chunks(line, MAX_TEXT_LENGTH)
        .into_iter()
        .map(|chunk| {
            json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": [text_object(&chunk)] }
            })
        })
        .collect()
}

fn text_object(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}
