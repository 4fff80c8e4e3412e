//! Description templating for pictures.
//!
//! Turns a picture's [`MetadataBag`] and the active site's [`User`] into the
//! wiki text uploaded alongside the file. Templates are [upon] templates, but
//! with `<< expr >>` and `<% block %>` delimiters instead of the usual braces,
//! because wiki text itself is full of `{{ }}`. Two extensions are registered:
//!
//! - **`date`**: formats EXIF timestamps (`2016:09:19 14:15:35`) as an ISO date
//!   (`2016-09-19`); other values are passed through unchanged.
//! - **`truncate`**: truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `<< value|truncate: n >>`.
//!
//! # Template Variables
//!
//! | Variable              | Type             | Description                                     |
//! |-----------------------|------------------|-------------------------------------------------|
//! | `file_name`           | `String`         | File name of the picture                        |
//! | `user.login`          | `String`         | Login of the active site's user                 |
//! | `user.display_name`   | `String`         | Display name of the active site's user          |
//! | `date`                | `Option<String>` | `DateTimeOriginal`, falling back to `DateTime`  |
//! | `location.latitude`   | `Option<String>` | Decimal latitude, if the picture is geotagged   |
//! | `location.longitude`  | `Option<String>` | Decimal longitude, if the picture is geotagged  |
//! | `metadata.<dir>.<tag>`| `String`         | Any extracted tag                               |
//! | `external.<column>`   | `Option<String>` | Matched [external metadata](crate::CsvMetadata) |
//!
//! Directory names under `metadata` are stripped of everything but word
//! characters, so `Exif SubIFD` becomes `metadata.ExifSubIFD`.
//!
//! # Example
//!
//! ```
//! use pixport_core::DescriptionTemplate;
//! use pixport_metadata::MetadataBag;
//! use pixport_session::User;
//!
//! let template: DescriptionTemplate = "<< file_name >> by << user.display_name >>".parse().unwrap();
//! let user = User::new("alice", "secret", "Alice");
//! let text = template.render("cat.jpg", &MetadataBag::new(), &user).unwrap();
//! assert_eq!(text, "cat.jpg by Alice");
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::external::ExternalRow;
use exn::ResultExt;
use pixport_metadata::{GPS_DIRECTORY, IFD0_DIRECTORY, MetadataBag, SUB_IFD_DIRECTORY, sanitize_tag};
use pixport_session::User;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Syntax, Template};

/// Built-in template producing a Wikimedia `{{Information}}` block.
pub const DEFAULT_TEMPLATE: &str = "\
=={{int:filedesc}}==
{{Information
|description=<< file_name >>
|date=<< date|date >>
|source={{own}}
|author=[[User:<< user.login >>|<< user.display_name >>]]
}}
<% if location %>{{Location dec|<< location.latitude >>|<< location.longitude >>}}
<% endif %>
=={{int:license-header}}==
{{self|cc-by-sa-4.0}}
";

const DEFAULT_NAME: &str = "default";

/// A named, compiled description template.
///
/// Compiled eagerly on construction so syntax errors surface when the
/// template is configured rather than when the first picture is rendered.
pub struct DescriptionTemplate {
    name: String,
    description: String,
    source: String,
    engine: Engine<'static>,
    template: Template<'static>,
}

impl FromStr for DescriptionTemplate {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(DEFAULT_NAME, "", s)
    }
}

impl std::fmt::Debug for DescriptionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptionTemplate")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl DescriptionTemplate {
    /// Compiles `text`. Returns [`ErrorKind::Template`] if the syntax is invalid.
    pub fn new(name: impl Into<String>, description: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let mut engine = Engine::with_syntax(Syntax::builder().expr("<<", ">>").block("<%", "%>").build());
        addons::configure(&mut engine);
        let source = text.into();
        let template = engine.compile(source.clone()).or_raise(|| ErrorKind::Template)?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            source,
            engine,
            template,
        })
    }

    /// The [built-in template](DEFAULT_TEMPLATE).
    pub fn builtin() -> Result<Self> {
        Self::new(DEFAULT_NAME, "Wikimedia Information template", DEFAULT_TEMPLATE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The uncompiled template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the description of one picture. Pure: the same inputs always
    /// give the same text.
    pub fn render(&self, file_name: &str, metadata: &MetadataBag, user: &User) -> Result<String> {
        self.render_with(file_name, metadata, None, user)
    }

    /// Like [`render`](Self::render), with a matched external metadata row.
    #[instrument(skip_all, fields(template = %self.name, file_name = %file_name))]
    pub fn render_with(
        &self,
        file_name: &str,
        metadata: &MetadataBag,
        external: Option<&ExternalRow>,
        user: &User,
    ) -> Result<String> {
        let parameters = Self::parameters(file_name, metadata, external, user)?;
        self.template.render(&self.engine, parameters).to_string().or_raise(|| ErrorKind::Template)
    }

    fn parameters(
        file_name: &str,
        metadata: &MetadataBag,
        external: Option<&ExternalRow>,
        user: &User,
    ) -> Result<upon::Value> {
        let directories: BTreeMap<String, _> =
            metadata.directories().map(|(name, tags)| (sanitize_tag(name), tags)).collect();
        let date = metadata
            .get(SUB_IFD_DIRECTORY, "DateTimeOriginal")
            .or_else(|| metadata.get(IFD0_DIRECTORY, "DateTime"));
        let location = metadata
            .get(GPS_DIRECTORY, "Latitude")
            .zip(metadata.get(GPS_DIRECTORY, "Longitude"))
            .map(|(latitude, longitude)| {
                upon::value! {
                    latitude: latitude,
                    longitude: longitude,
                }
            });
        Ok(upon::value! {
            file_name: file_name,
            user: upon::value! {
                login: user.login.as_str(),
                display_name: user.display_name.as_str(),
            },
            date: date,
            location: location,
            metadata: upon::to_value(directories).or_raise(|| ErrorKind::Template)?,
            external: upon::to_value(external).or_raise(|| ErrorKind::Template)?,
        })
    }
}

/// Custom [`upon`] extensions for wiki descriptions.
mod addons {
    use std::fmt::Write;
    use time::Date;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use upon::{Engine, Value, fmt as upon_fmt};

    const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

    /// EXIF writes dates as `YYYY:MM:DD hh:mm:ss`; only the date part is kept.
    pub(super) fn iso_date(raw: &str) -> Option<String> {
        let head: String = raw.trim().chars().take(10).map(|c| if c == ':' { '-' } else { c }).collect();
        Date::parse(&head, ISO_DATE).ok()?.format(ISO_DATE).ok()
    }

    fn date_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => match iso_date(s) {
                Some(date) => write!(f, "{date}")?,
                None => write!(f, "{s}")?,
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("date", date_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn user() -> User {
        User::new("alice", "secret", "Alice Liddell")
    }

    fn bag() -> MetadataBag {
        [
            (SUB_IFD_DIRECTORY, "DateTimeOriginal", "2016:09:19 14:15:35"),
            (IFD0_DIRECTORY, "Make", "Canon"),
            (GPS_DIRECTORY, "Latitude", "48.858370"),
            (GPS_DIRECTORY, "Longitude", "2.294481"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_renders_metadata_and_user() {
        let template: DescriptionTemplate =
            "<< metadata.ExifIFD0.Make >> photo << file_name >> by << user.login >>".parse().unwrap();
        let text = template.render("tower.jpg", &bag(), &user()).unwrap();
        assert_eq!(text, "Canon photo tower.jpg by alice");
    }

    #[test]
    fn test_default_template() {
        let template = DescriptionTemplate::builtin().unwrap();
        let text = template.render("tower.jpg", &bag(), &user()).unwrap();
        assert!(text.contains("{{Information"));
        assert!(text.contains("|description=tower.jpg"));
        assert!(text.contains("|date=2016-09-19"));
        assert!(text.contains("[[User:alice|Alice Liddell]]"));
        assert!(text.contains("{{Location dec|48.858370|2.294481}}"));
    }

    #[test]
    fn test_default_template_without_exif() {
        let template = DescriptionTemplate::builtin().unwrap();
        let text = template.render("scan.png", &MetadataBag::new(), &user()).unwrap();
        assert!(text.contains("|date=\n"));
        assert!(!text.contains("{{Location dec"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = DescriptionTemplate::builtin().unwrap();
        let first = template.render("tower.jpg", &bag(), &user()).unwrap();
        let second = template.render("tower.jpg", &bag(), &user()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_syntax_fails_on_construction() {
        let err = "<< file_name ".parse::<DescriptionTemplate>().unwrap_err();
        assert_eq!(*err, ErrorKind::Template);
    }

    #[test]
    fn test_missing_variable_fails_on_render() {
        let template: DescriptionTemplate = "<< metadata.Nope.Nothing >>".parse().unwrap();
        let err = template.render("a.jpg", &bag(), &user()).unwrap_err();
        assert_eq!(*err, ErrorKind::Template);
    }

    #[test]
    fn test_external_metadata() {
        let template: DescriptionTemplate =
            "<< file_name >><% if external %>: << external.title >><% endif %>".parse().unwrap();
        let row: ExternalRow = [("title".to_string(), "A cat".to_string())].into_iter().collect();
        assert_eq!(template.render_with("cat.jpg", &bag(), Some(&row), &user()).unwrap(), "cat.jpg: A cat");
        assert_eq!(template.render("cat.jpg", &bag(), &user()).unwrap(), "cat.jpg");
    }

    #[test]
    fn test_truncate() {
        let template: DescriptionTemplate = "<< file_name|truncate: 5 >>/<< truncate(user.display_name, 5) >>".parse().unwrap();
        assert_eq!(template.render("panorama.jpg", &bag(), &user()).unwrap(), "panor/Alice");
    }

    #[rstest]
    #[case("2016:09:19 14:15:35", Some("2016-09-19"))]
    #[case("2016-09-19", Some("2016-09-19"))]
    #[case("yesterday", None)]
    #[case("", None)]
    fn test_iso_date(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(addons::iso_date(raw).as_deref(), expected);
    }
}
