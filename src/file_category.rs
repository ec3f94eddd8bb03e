/// File categorization system for organizing files by extension.
///
/// This module maps file extensions to categories. Built-in categories are
/// fixed and tried in a fixed precedence order; custom commands defined in
/// the configuration are tried before them, so a custom command can claim an
/// extension that a built-in category also lists.
///
/// # Examples
///
/// ```
/// use auv::file_category::{Category, CategoryId, Classifier};
/// use auv::config::Config;
///
/// let classifier = Classifier::from_config(&Config::default());
/// assert_eq!(
///     classifier.classify(".PDF"),
///     Some(&CategoryId::Builtin(Category::Pdf))
/// );
/// assert_eq!(classifier.classify(".xyz"), None);
/// ```
use crate::config::Config;
use std::fmt;
use std::path::{Path, PathBuf};

/// Compound suffixes that must be matched before the final extension.
const COMPOUND_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tar.bz2", ".tar.xz", ".tar.lzma", ".tar.z", ".tar.lz", ".tar.lzo",
];

/// A built-in file category.
///
/// Variants are declared in precedence order: when two enabled built-ins list
/// the same extension, the earlier one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// PDF documents
    Pdf,
    /// Image files (PNG, JPG, GIF, etc.)
    Image,
    /// Office and text documents (DOCX, TXT, XLSX, etc.)
    Document,
    /// Video files (MP4, MKV, AVI, etc.)
    Video,
    /// Audio files (MP3, WAV, FLAC, etc.)
    Audio,
    /// Installers and packages (EXE, DMG, DEB, etc.)
    Installer,
    /// Archive files (ZIP, RAR, 7Z, etc.)
    Archive,
    /// Source code, data and script files
    Code,
    /// Font files (TTF, OTF, WOFF, etc.)
    Font,
    /// E-books (EPUB, MOBI, etc.)
    Ebook,
}

impl Category {
    /// All built-in categories in precedence order.
    pub const ALL: [Category; 10] = [
        Category::Pdf,
        Category::Image,
        Category::Document,
        Category::Video,
        Category::Audio,
        Category::Installer,
        Category::Archive,
        Category::Code,
        Category::Font,
        Category::Ebook,
    ];

    /// Returns the identifier used in the configuration document and on the
    /// command line.
    ///
    /// ```
    /// use auv::file_category::Category;
    ///
    /// assert_eq!(Category::Pdf.id(), "pdf");
    /// assert_eq!(Category::Ebook.id(), "ebook");
    /// ```
    pub fn id(&self) -> &'static str {
        match self {
            Category::Pdf => "pdf",
            Category::Image => "image",
            Category::Document => "document",
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Installer => "installer",
            Category::Archive => "archive",
            Category::Code => "code",
            Category::Font => "font",
            Category::Ebook => "ebook",
        }
    }

    /// Looks up a built-in category by identifier (case-insensitive).
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.to_lowercase();
        Self::ALL.into_iter().find(|category| category.id() == id)
    }

    /// Returns the folder name used when organizing "here".
    pub fn folder_name(&self) -> &'static str {
        match self {
            Category::Pdf => "PDF",
            Category::Image => "Images",
            Category::Document => "Documents",
            Category::Video => "Videos",
            Category::Audio => "Audio",
            Category::Installer => "Installers",
            Category::Archive => "Archives",
            Category::Code => "Code",
            Category::Font => "Fonts",
            Category::Ebook => "eBooks",
        }
    }

    /// Whether a fresh configuration enables this category.
    pub fn enabled_by_default(&self) -> bool {
        matches!(
            self,
            Category::Pdf | Category::Image | Category::Document | Category::Video | Category::Audio
        )
    }

    /// Default target directory, relative to the user's home directory.
    pub fn default_target(&self, home: &Path) -> PathBuf {
        match self {
            Category::Pdf => home.join("Documents").join("PDFs"),
            Category::Image => home.join("Pictures"),
            Category::Document => home.join("Documents"),
            Category::Video => home.join("Videos"),
            Category::Audio => home.join("Music"),
            Category::Installer => home.join("Downloads").join("Installers"),
            Category::Archive => home.join("Downloads").join("Archives"),
            Category::Code => home.join("Documents").join("Code"),
            Category::Font => home.join("Downloads").join("Fonts"),
            Category::Ebook => home.join("Documents").join("eBooks"),
        }
    }

    /// Returns a human-readable description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Pdf => "PDF documents",
            Category::Image => "Image files",
            Category::Document => "Document files",
            Category::Video => "Video files",
            Category::Audio => "Audio files",
            Category::Installer => "Installers and packages",
            Category::Archive => "Archive files",
            Category::Code => "Source code files",
            Category::Font => "Font files",
            Category::Ebook => "E-books",
        }
    }

    /// The extensions this category claims, lowercase with a leading dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Category::Pdf => &[".pdf"],
            Category::Image => &[
                ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".svg", ".webp",
            ],
            Category::Document => &[
                ".doc", ".docx", ".txt", ".rtf", ".odt", ".xls", ".xlsx", ".ppt", ".pptx",
            ],
            Category::Video => &[
                ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".m4v",
            ],
            Category::Audio => &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a"],
            Category::Installer => &[
                // Windows
                ".exe", ".msi", ".msix", ".appx", ".appxbundle",
                // macOS
                ".dmg", ".pkg", ".mpkg",
                // Linux
                ".deb", ".rpm", ".snap", ".flatpak", ".appimage",
                // Cross-platform
                ".jar", ".app",
            ],
            Category::Archive => &[
                ".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz", ".tar.gz", ".tar.bz2",
                ".tar.xz", ".tgz", ".tbz2", ".iso", ".img", ".cab", ".ace", ".lz", ".lzma",
            ],
            Category::Code => &[
                // Web
                ".html", ".htm", ".css", ".js", ".ts", ".jsx", ".tsx", ".php", ".asp", ".aspx",
                ".jsp",
                // Languages
                ".py", ".java", ".c", ".cpp", ".cc", ".cxx", ".h", ".hpp", ".cs", ".vb", ".go",
                ".rs", ".swift", ".kt", ".rb", ".pl", ".lua", ".r", ".m", ".scala",
                // Data and config
                ".json", ".xml", ".yaml", ".yml", ".toml", ".ini", ".cfg", ".sql", ".db",
                ".sqlite", ".sqlite3",
                // Scripts
                ".sh", ".bash", ".zsh", ".fish", ".ps1", ".bat", ".cmd",
                // Build files
                ".makefile", ".cmake", ".gradle", ".maven", ".sbt",
            ],
            Category::Font => &[
                ".ttf", ".otf", ".woff", ".woff2", ".eot", ".pfb", ".pfm", ".afm", ".bdf", ".pcf",
            ],
            Category::Ebook => &[
                ".epub", ".mobi", ".azw", ".azw3", ".fb2", ".lit", ".pdb", ".prc", ".djvu", ".chm",
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Identifies whatever claimed a file: a built-in category or a custom command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryId {
    Builtin(Category),
    Custom(String),
}

impl CategoryId {
    /// Resolves a command-line selector against the configuration.
    ///
    /// Custom command names are checked first.
    pub fn resolve(name: &str, config: &Config) -> Option<Self> {
        if config.custom_commands.get(name).is_some() {
            return Some(CategoryId::Custom(name.to_string()));
        }
        Category::from_id(name).map(CategoryId::Builtin)
    }

    /// The name shown to users and stored in configuration keys.
    pub fn name(&self) -> &str {
        match self {
            CategoryId::Builtin(category) => category.id(),
            CategoryId::Custom(name) => name,
        }
    }

    /// Folder name used when organizing "here".
    ///
    /// Custom commands get `<Name>Files`, e.g. `py` becomes `PyFiles`.
    pub fn folder_name(&self) -> String {
        match self {
            CategoryId::Builtin(category) => category.folder_name().to_string(),
            CategoryId::Custom(name) => format!("{}Files", title_case(name)),
        }
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Uppercases the first character of `name`.
pub(crate) fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Normalizes an extension to lowercase with exactly one leading dot.
///
/// ```
/// use auv::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension("PY"), ".py");
/// assert_eq!(normalize_extension(".Tar.GZ"), ".tar.gz");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}

/// One resolver rule: a category and the extensions it claims.
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: CategoryId,
    extensions: Vec<String>,
}

impl Rule {
    fn new(category: CategoryId, extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            category,
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    fn claims(&self, ext: &str) -> bool {
        self.extensions.iter().any(|claimed| claimed == ext)
    }
}

/// Maps extensions to categories by trying an ordered list of rules.
///
/// Only enabled categories contribute rules. Custom commands come first, in
/// configuration order, followed by the built-ins in precedence order.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Builds the rule list from a configuration snapshot.
    pub fn from_config(config: &Config) -> Self {
        let custom = config
            .custom_commands
            .iter()
            .filter(|(_, command)| command.enabled)
            .map(|(name, command)| Rule::new(CategoryId::Custom(name.clone()), &command.extensions));

        let builtin = Category::ALL
            .into_iter()
            .filter(|category| config.is_category_enabled(*category))
            .map(|category| Rule::new(CategoryId::Builtin(category), category.extensions()));

        Self {
            rules: custom.chain(builtin).collect(),
        }
    }

    /// Returns the rules in the order they are tried.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classifies a single extension. Case-insensitive; the leading dot is
    /// optional.
    pub fn classify(&self, ext: &str) -> Option<&CategoryId> {
        let ext = normalize_extension(ext);
        self.rules
            .iter()
            .find(|rule| rule.claims(&ext))
            .map(|rule| &rule.category)
    }

    /// Classifies a file by name, trying a compound suffix such as `.tar.gz`
    /// before the final extension.
    pub fn classify_path(&self, path: &Path) -> Option<&CategoryId> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if let Some(compound) = COMPOUND_SUFFIXES.iter().find(|suffix| name.ends_with(*suffix))
            && let Some(category) = self.classify(compound)
        {
            return Some(category);
        }

        let ext = path.extension()?.to_string_lossy();
        self.classify(&ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomCommand;

    fn custom(extensions: &[&str]) -> CustomCommand {
        CustomCommand {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            target_path: PathBuf::from("/tmp/custom"),
            enabled: true,
        }
    }

    #[test]
    fn test_category_ids_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_id(category.id()), Some(category));
        }
        assert_eq!(Category::from_id("IMAGE"), Some(Category::Image));
        assert_eq!(Category::from_id("spreadsheet"), None);
    }

    #[test]
    fn test_every_enabled_extension_classifies_to_its_category() {
        let mut config = Config::default();
        for category in Category::ALL {
            config.file_types.insert(category.id().to_string(), true);
        }
        let classifier = Classifier::from_config(&config);

        for category in Category::ALL {
            for ext in category.extensions() {
                assert_eq!(
                    classifier.classify(ext),
                    Some(&CategoryId::Builtin(category)),
                    "extension {}",
                    ext
                );
            }
        }
    }

    #[test]
    fn test_classify_is_case_insensitive_and_dot_tolerant() {
        let classifier = Classifier::from_config(&Config::default());
        let pdf = CategoryId::Builtin(Category::Pdf);
        assert_eq!(classifier.classify(".pdf"), Some(&pdf));
        assert_eq!(classifier.classify(".PDF"), Some(&pdf));
        assert_eq!(classifier.classify("pdf"), Some(&pdf));
    }

    #[test]
    fn test_disabled_categories_do_not_classify() {
        let classifier = Classifier::from_config(&Config::default());
        // Code is disabled by default.
        assert_eq!(classifier.classify(".py"), None);
        assert_eq!(classifier.classify(".unknown"), None);

        let mut config = Config::default();
        config.file_types.insert("pdf".to_string(), false);
        let classifier = Classifier::from_config(&config);
        assert_eq!(classifier.classify(".pdf"), None);
    }

    #[test]
    fn test_custom_command_shadows_builtin() {
        let mut config = Config::default();
        config.file_types.insert("code".to_string(), true);
        config.custom_commands.insert("py".to_string(), custom(&[".py"]));
        let classifier = Classifier::from_config(&config);

        assert_eq!(
            classifier.classify(".py"),
            Some(&CategoryId::Custom("py".to_string()))
        );
        assert_eq!(
            classifier.classify(".rs"),
            Some(&CategoryId::Builtin(Category::Code))
        );
    }

    #[test]
    fn test_disabled_custom_command_does_not_shadow() {
        let mut config = Config::default();
        config.file_types.insert("code".to_string(), true);
        let mut command = custom(&["py"]);
        command.enabled = false;
        config.custom_commands.insert("py".to_string(), command);
        let classifier = Classifier::from_config(&config);

        assert_eq!(
            classifier.classify(".py"),
            Some(&CategoryId::Builtin(Category::Code))
        );
    }

    #[test]
    fn test_custom_commands_keep_configuration_order() {
        let mut config = Config::default();
        config.custom_commands.insert("first".to_string(), custom(&[".dat"]));
        config.custom_commands.insert("second".to_string(), custom(&[".dat"]));
        let classifier = Classifier::from_config(&config);

        assert_eq!(
            classifier.classify(".dat"),
            Some(&CategoryId::Custom("first".to_string()))
        );
    }

    #[test]
    fn test_classify_path_prefers_compound_suffix() {
        let mut config = Config::default();
        config.file_types.insert("archive".to_string(), true);
        config.custom_commands.insert("gz".to_string(), custom(&[".gz"]));
        let classifier = Classifier::from_config(&config);

        assert_eq!(
            classifier.classify_path(Path::new("/tmp/backup.tar.gz")),
            Some(&CategoryId::Builtin(Category::Archive))
        );
        assert_eq!(
            classifier.classify_path(Path::new("/tmp/log.gz")),
            Some(&CategoryId::Custom("gz".to_string()))
        );
        assert_eq!(classifier.classify_path(Path::new("/tmp/README")), None);
    }

    #[test]
    fn test_folder_names() {
        assert_eq!(CategoryId::Builtin(Category::Pdf).folder_name(), "PDF");
        assert_eq!(CategoryId::Custom("py".to_string()).folder_name(), "PyFiles");
    }
}
