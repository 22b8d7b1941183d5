use serde_yaml_ng::{Mapping, Value};

/// A markdown document split into YAML frontmatter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub frontmatter: Option<Mapping>,
    pub body: String,
}

impl ParsedDocument {
    /// Frontmatter mapping, created empty if the document had none.
    pub fn frontmatter_mut(&mut self) -> &mut Mapping {
        self.frontmatter.get_or_insert_with(Mapping::new)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.frontmatter.as_ref()?.get(key)?.as_str()
    }

    /// Serialize back to `---\n<yaml>---\n<body>`.
    /// An absent or empty frontmatter renders as the body alone.
    pub fn render(&self) -> Result<String, FrontmatterError> {
        match &self.frontmatter {
            Some(fm) if !fm.is_empty() => {
                let yaml = serde_yaml_ng::to_string(fm)
                    .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;
                Ok(format!("---\n{yaml}---\n{}", self.body))
            }
            _ => Ok(self.body.clone()),
        }
    }

    /// Frontmatter converted to JSON for the host store.
    pub fn data(&self) -> Result<serde_json::Map<String, serde_json::Value>, FrontmatterError> {
        let Some(fm) = &self.frontmatter else {
            return Ok(serde_json::Map::new());
        };

        match serde_json::to_value(fm) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(FrontmatterError::NotAMapping),
            Err(e) => Err(FrontmatterError::InvalidYaml(e.to_string())),
        }
    }
}

/// Parse a markdown document, extracting YAML frontmatter if present.
///
/// Frontmatter must be delimited by `---` on its own line at the very
/// start of the document.
pub fn parse(content: &str) -> Result<ParsedDocument, FrontmatterError> {
    let trimmed = content.trim_start();

    if !trimmed.starts_with("---") {
        return Ok(ParsedDocument {
            frontmatter: None,
            body: content.to_owned(),
        });
    }

    let after_opening = &trimmed[3..];
    let Some(end_pos) = after_opening.find("\n---") else {
        return Ok(ParsedDocument {
            frontmatter: None,
            body: content.to_owned(),
        });
    };

    let yaml_str = &after_opening[..end_pos];
    let rest_start = end_pos + 4; // skip past "\n---"
    let body = after_opening[rest_start..]
        .strip_prefix('\n')
        .unwrap_or(&after_opening[rest_start..]);

    let frontmatter = if yaml_str.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml_ng::from_str::<Value>(yaml_str)
            .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?
        {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => return Err(FrontmatterError::NotAMapping),
        }
    };

    Ok(ParsedDocument {
        frontmatter: Some(frontmatter),
        body: body.to_owned(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),

    #[error("frontmatter is not a mapping")]
    NotAMapping,
}
