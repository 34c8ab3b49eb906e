//! Conversions between editor-native values and LSP protocol values.
//!
//! Editor positions are 1-based; protocol positions are 0-based. Both count
//! columns in UTF-16 code units, so the mapping is a plain offset by one.
//! Nothing here has state or business rules.

use crate::editor::{
    EditorCompletionItem, EditorCompletionKind, EditorCompletionList, EditorDocumentation,
    EditorFormattingOptions, EditorHover, EditorPosition, EditorRange, EditorSymbol,
    EditorSymbolKind, EditorTextEdit, Marker, MarkerSeverity,
};
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionTextEdit, Diagnostic,
    DiagnosticSeverity, Documentation, DocumentSymbol, DocumentSymbolResponse, FormattingOptions,
    Hover, HoverContents, InsertTextFormat, MarkedString, MarkupContent, MarkupKind,
    NumberOrString, Position, Range, SymbolInformation, SymbolKind, TextEdit,
};

const COMPLETION_KINDS: [(CompletionItemKind, EditorCompletionKind); 25] = [
    (CompletionItemKind::TEXT, EditorCompletionKind::Text),
    (CompletionItemKind::METHOD, EditorCompletionKind::Method),
    (CompletionItemKind::FUNCTION, EditorCompletionKind::Function),
    (CompletionItemKind::CONSTRUCTOR, EditorCompletionKind::Constructor),
    (CompletionItemKind::FIELD, EditorCompletionKind::Field),
    (CompletionItemKind::VARIABLE, EditorCompletionKind::Variable),
    (CompletionItemKind::CLASS, EditorCompletionKind::Class),
    (CompletionItemKind::INTERFACE, EditorCompletionKind::Interface),
    (CompletionItemKind::MODULE, EditorCompletionKind::Module),
    (CompletionItemKind::PROPERTY, EditorCompletionKind::Property),
    (CompletionItemKind::UNIT, EditorCompletionKind::Unit),
    (CompletionItemKind::VALUE, EditorCompletionKind::Value),
    (CompletionItemKind::ENUM, EditorCompletionKind::Enum),
    (CompletionItemKind::KEYWORD, EditorCompletionKind::Keyword),
    (CompletionItemKind::SNIPPET, EditorCompletionKind::Snippet),
    (CompletionItemKind::COLOR, EditorCompletionKind::Color),
    (CompletionItemKind::FILE, EditorCompletionKind::File),
    (CompletionItemKind::REFERENCE, EditorCompletionKind::Reference),
    (CompletionItemKind::FOLDER, EditorCompletionKind::Folder),
    (CompletionItemKind::ENUM_MEMBER, EditorCompletionKind::EnumMember),
    (CompletionItemKind::CONSTANT, EditorCompletionKind::Constant),
    (CompletionItemKind::STRUCT, EditorCompletionKind::Struct),
    (CompletionItemKind::EVENT, EditorCompletionKind::Event),
    (CompletionItemKind::OPERATOR, EditorCompletionKind::Operator),
    (CompletionItemKind::TYPE_PARAMETER, EditorCompletionKind::TypeParameter),
];

// Index in this table is the editor-side symbol kind.
const SYMBOL_KINDS: [SymbolKind; 26] = [
    SymbolKind::FILE,
    SymbolKind::MODULE,
    SymbolKind::NAMESPACE,
    SymbolKind::PACKAGE,
    SymbolKind::CLASS,
    SymbolKind::METHOD,
    SymbolKind::PROPERTY,
    SymbolKind::FIELD,
    SymbolKind::CONSTRUCTOR,
    SymbolKind::ENUM,
    SymbolKind::INTERFACE,
    SymbolKind::FUNCTION,
    SymbolKind::VARIABLE,
    SymbolKind::CONSTANT,
    SymbolKind::STRING,
    SymbolKind::NUMBER,
    SymbolKind::BOOLEAN,
    SymbolKind::ARRAY,
    SymbolKind::OBJECT,
    SymbolKind::KEY,
    SymbolKind::NULL,
    SymbolKind::ENUM_MEMBER,
    SymbolKind::STRUCT,
    SymbolKind::EVENT,
    SymbolKind::OPERATOR,
    SymbolKind::TYPE_PARAMETER,
];

/// Characters that end a YAML "word" when computing the default completion range.
const WORD_SEPARATORS: &[char] = &[':', ',', '[', ']', '{', '}', '"', '\'', '#', '&', '*', '!', '|', '>'];

/// Converts an editor position (1-based) into a protocol position (0-based).
///
/// # Examples
///
/// ```
/// use yaml_bridge::convert::as_position;
/// use yaml_bridge::editor::EditorPosition;
///
/// let position = as_position(EditorPosition::new(1, 15));
/// assert_eq!((position.line, position.character), (0, 14));
/// ```
pub fn as_position(position: EditorPosition) -> Position {
    Position::new(
        position.line_number.saturating_sub(1),
        position.column.saturating_sub(1),
    )
}

pub fn as_editor_position(position: Position) -> EditorPosition {
    EditorPosition::new(position.line + 1, position.character + 1)
}

pub fn as_range(range: EditorRange) -> Range {
    Range::new(as_position(range.start()), as_position(range.end()))
}

pub fn as_editor_range(range: Range) -> EditorRange {
    EditorRange::new(
        range.start.line + 1,
        range.start.character + 1,
        range.end.line + 1,
        range.end.character + 1,
    )
}

/// Maps a diagnostic severity; a missing severity is treated as an error.
pub fn as_marker_severity(severity: Option<DiagnosticSeverity>) -> MarkerSeverity {
    match severity {
        Some(s) if s == DiagnosticSeverity::WARNING => MarkerSeverity::Warning,
        Some(s) if s == DiagnosticSeverity::INFORMATION => MarkerSeverity::Info,
        Some(s) if s == DiagnosticSeverity::HINT => MarkerSeverity::Hint,
        _ => MarkerSeverity::Error,
    }
}

pub fn as_marker(diagnostic: Diagnostic) -> Marker {
    Marker {
        severity: as_marker_severity(diagnostic.severity),
        message: diagnostic.message,
        source: diagnostic.source,
        code: diagnostic.code.map(|code| match code {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s,
        }),
        range: as_editor_range(diagnostic.range),
    }
}

pub fn as_markers(diagnostics: Vec<Diagnostic>) -> Vec<Marker> {
    diagnostics.into_iter().map(as_marker).collect()
}

/// Maps a protocol completion kind; unknown or missing kinds become `Property`,
/// which is what YAML keys are.
pub fn as_completion_kind(kind: Option<CompletionItemKind>) -> EditorCompletionKind {
    kind.and_then(|kind| {
        COMPLETION_KINDS
            .iter()
            .find(|(protocol, _)| *protocol == kind)
            .map(|(_, editor)| *editor)
    })
    .unwrap_or(EditorCompletionKind::Property)
}

pub fn as_protocol_completion_kind(kind: EditorCompletionKind) -> CompletionItemKind {
    COMPLETION_KINDS
        .iter()
        .find(|(_, editor)| *editor == kind)
        .map_or(CompletionItemKind::PROPERTY, |(protocol, _)| *protocol)
}

pub fn as_symbol_kind(kind: SymbolKind) -> EditorSymbolKind {
    let index = SYMBOL_KINDS.iter().position(|k| *k == kind).unwrap_or(0);
    EditorSymbolKind(index as u8)
}

pub fn as_documentation(documentation: Documentation) -> EditorDocumentation {
    match documentation {
        Documentation::String(text) => EditorDocumentation::Plain(text),
        Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }) => EditorDocumentation::Markdown(value),
        Documentation::MarkupContent(MarkupContent { value, .. }) => {
            EditorDocumentation::Plain(value)
        }
    }
}

fn as_protocol_documentation(documentation: EditorDocumentation) -> Documentation {
    match documentation {
        EditorDocumentation::Plain(text) => Documentation::String(text),
        EditorDocumentation::Markdown(value) => Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
    }
}

/// Converts a protocol completion item.
///
/// The replace range comes from the item's text edit; items without one
/// replace `default_range` (usually the word at the cursor).
pub fn as_completion_item(item: CompletionItem, default_range: EditorRange) -> EditorCompletionItem {
    let (range, insert_text) = match item.text_edit {
        Some(CompletionTextEdit::Edit(edit)) => (as_editor_range(edit.range), edit.new_text),
        Some(CompletionTextEdit::InsertAndReplace(edit)) => {
            (as_editor_range(edit.replace), edit.new_text)
        }
        None => (
            default_range,
            item.insert_text.unwrap_or_else(|| item.label.clone()),
        ),
    };

    EditorCompletionItem {
        kind: as_completion_kind(item.kind),
        detail: item.detail,
        documentation: item.documentation.map(as_documentation),
        sort_text: item.sort_text,
        filter_text: item.filter_text,
        insert_text,
        insert_as_snippet: item.insert_text_format == Some(InsertTextFormat::SNIPPET),
        range: Some(range),
        additional_text_edits: item
            .additional_text_edits
            .map(as_text_edits)
            .unwrap_or_default(),
        preselect: item.preselect.unwrap_or(false),
        data: item.data,
        label: item.label,
    }
}

pub fn as_completion_list(list: CompletionList, default_range: EditorRange) -> EditorCompletionList {
    EditorCompletionList {
        suggestions: list
            .items
            .into_iter()
            .map(|item| as_completion_item(item, default_range))
            .collect(),
        incomplete: list.is_incomplete,
    }
}

/// Converts an editor completion item back for `completionItem/resolve`.
pub fn as_protocol_completion_item(item: EditorCompletionItem) -> CompletionItem {
    let text_edit = item.range.map(|range| {
        CompletionTextEdit::Edit(TextEdit {
            range: as_range(range),
            new_text: item.insert_text.clone(),
        })
    });

    CompletionItem {
        label: item.label,
        kind: Some(as_protocol_completion_kind(item.kind)),
        detail: item.detail,
        documentation: item.documentation.map(as_protocol_documentation),
        sort_text: item.sort_text,
        filter_text: item.filter_text,
        insert_text_format: Some(if item.insert_as_snippet {
            InsertTextFormat::SNIPPET
        } else {
            InsertTextFormat::PLAIN_TEXT
        }),
        insert_text: Some(item.insert_text),
        text_edit,
        additional_text_edits: if item.additional_text_edits.is_empty() {
            None
        } else {
            Some(
                item.additional_text_edits
                    .into_iter()
                    .map(as_protocol_text_edit)
                    .collect(),
            )
        },
        preselect: item.preselect.then_some(true),
        data: item.data,
        ..Default::default()
    }
}

pub fn as_text_edit(edit: TextEdit) -> EditorTextEdit {
    EditorTextEdit {
        range: as_editor_range(edit.range),
        text: edit.new_text,
    }
}

pub fn as_text_edits(edits: Vec<TextEdit>) -> Vec<EditorTextEdit> {
    edits.into_iter().map(as_text_edit).collect()
}

pub fn as_protocol_text_edit(edit: EditorTextEdit) -> TextEdit {
    TextEdit {
        range: as_range(edit.range),
        new_text: edit.text,
    }
}

fn as_nested_symbol(symbol: DocumentSymbol) -> EditorSymbol {
    EditorSymbol {
        name: symbol.name,
        detail: symbol.detail.unwrap_or_default(),
        kind: as_symbol_kind(symbol.kind),
        container_name: None,
        range: as_editor_range(symbol.range),
        selection_range: as_editor_range(symbol.selection_range),
        children: symbol
            .children
            .unwrap_or_default()
            .into_iter()
            .map(as_nested_symbol)
            .collect(),
    }
}

fn as_flat_symbol(symbol: SymbolInformation) -> EditorSymbol {
    let range = as_editor_range(symbol.location.range);
    EditorSymbol {
        name: symbol.name,
        detail: String::new(),
        kind: as_symbol_kind(symbol.kind),
        container_name: symbol.container_name,
        range,
        selection_range: range,
        children: Vec::new(),
    }
}

pub fn as_symbols(response: DocumentSymbolResponse) -> Vec<EditorSymbol> {
    match response {
        DocumentSymbolResponse::Flat(symbols) => symbols.into_iter().map(as_flat_symbol).collect(),
        DocumentSymbolResponse::Nested(symbols) => {
            symbols.into_iter().map(as_nested_symbol).collect()
        }
    }
}

fn marked_string_to_markdown(marked: MarkedString) -> String {
    match marked {
        MarkedString::String(text) => text,
        MarkedString::LanguageString(code) => {
            format!("```{}\n{}\n```", code.language, code.value)
        }
    }
}

pub fn as_hover(hover: Hover) -> EditorHover {
    let contents = match hover.contents {
        HoverContents::Scalar(marked) => vec![marked_string_to_markdown(marked)],
        HoverContents::Array(items) => items.into_iter().map(marked_string_to_markdown).collect(),
        HoverContents::Markup(markup) => vec![markup.value],
    };

    EditorHover {
        contents,
        range: hover.range.map(as_editor_range),
    }
}

pub fn as_formatting_options(options: &EditorFormattingOptions) -> FormattingOptions {
    FormattingOptions {
        tab_size: options.tab_size,
        insert_spaces: options.insert_spaces,
        ..Default::default()
    }
}

/// Range covering the word that ends at `position` on its line.
///
/// Used as the replace range for completion items that carry no text edit.
pub fn word_range_at(line: &str, position: EditorPosition) -> EditorRange {
    let cursor_units = position.column.saturating_sub(1);
    let mut units = 0u32;
    let mut word_start = 0u32;

    for ch in line.chars() {
        if units >= cursor_units {
            break;
        }
        units += ch.len_utf16() as u32;
        if ch.is_whitespace() || WORD_SEPARATORS.contains(&ch) {
            word_start = units;
        }
    }

    EditorRange::new(
        position.line_number,
        word_start + 1,
        position.line_number,
        units + 1,
    )
}
