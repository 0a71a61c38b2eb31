//! PDF rendering of a document snapshot.
//!
//! Pure function of `(document, options)`: the same snapshot and
//! `generated_at` produce the same bytes. Uses the PDF base-14 Type1 fonts
//! with WinAnsi encoding, so no font files are embedded.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use thiserror::Error;

use crate::document::{Document, DocumentKind};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BOTTOM: f32 = 70.0;
const LINE: f32 = 14.0;
const DESCRIPTION_CHARS: usize = 58;
const WRAP_CHARS: usize = 95;

const COL_QTY: f32 = 340.0;
const COL_UNIT_RIGHT: f32 = 465.0;
const COL_AMOUNT_RIGHT: f32 = PAGE_WIDTH - MARGIN;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf encoding failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub agency_name: String,
    /// Written to the Info dictionary and the page footer.
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Lays text out top to bottom, breaking to a new page when it runs out of
/// room.
struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        // `pages` always holds at least one page.
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Reserve `lines` rows, breaking first if they do not fit.
    fn reserve(&mut self, lines: usize) -> bool {
        if self.y - LINE * (lines as f32) < BOTTOM {
            self.new_page();
            return true;
        }
        false
    }

    fn text(&mut self, font: Font, size: f32, x: f32, text: &str) {
        let y = self.y;
        push_text(self.ops(), font, size, x, y, text);
    }

    fn text_right(&mut self, font: Font, size: f32, right: f32, text: &str) {
        let x = right - text_width(text, size);
        self.text(font, size, x, text);
    }

    fn rule(&mut self) {
        let y = self.y + 4.0;
        let ops = self.ops();
        ops.push(Operation::new("w", vec![0.5_f32.into()]));
        ops.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
        ops.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    fn advance(&mut self, lines: f32) {
        self.y -= LINE * lines;
    }

    fn line(&mut self, font: Font, size: f32, text: &str) {
        self.reserve(1);
        self.text(font, size, MARGIN, text);
        self.advance(1.0);
    }
}

pub fn render(document: &Document, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let mut layout = Layout::new();
    let currency = document.currency;
    let totals = document.totals();

    // Header
    layout.text(Font::Bold, 18.0, MARGIN, &options.agency_name);
    layout.text_right(
        Font::Bold,
        16.0,
        PAGE_WIDTH - MARGIN,
        &document.kind.label().to_uppercase(),
    );
    layout.advance(2.0);
    layout.line(Font::Regular, 10.0, &format!("Reference: {}", document.reference));
    let issued = document.issued_at.unwrap_or(document.created_at);
    layout.line(Font::Regular, 10.0, &format!("Date: {}", issued.format("%-d %B %Y")));
    if let Some(expires_at) = document.expires_at {
        layout.line(
            Font::Regular,
            10.0,
            &format!("Valid until: {}", expires_at.format("%-d %B %Y")),
        );
    }
    if let Some(due) = document.due_date {
        layout.line(Font::Regular, 10.0, &format!("Due: {}", due.format("%-d %B %Y")));
    }
    layout.line(Font::Regular, 10.0, &format!("Status: {}", document.status));
    layout.advance(1.0);

    // Party
    layout.line(Font::Bold, 11.0, "Prepared for");
    layout.line(Font::Regular, 10.0, &document.party.name);
    if let Some(company) = &document.party.company {
        layout.line(Font::Regular, 10.0, company);
    }
    layout.line(Font::Regular, 10.0, &document.party.email);
    if let Some(phone) = &document.party.phone {
        layout.line(Font::Regular, 10.0, phone);
    }
    if let Some(address) = &document.party.address {
        for part in address.lines().filter(|l| !l.trim().is_empty()) {
            layout.line(Font::Regular, 10.0, part.trim());
        }
    }
    layout.advance(1.0);
    layout.line(Font::Bold, 13.0, &document.title);
    layout.advance(0.5);

    // Line items
    table_header(&mut layout);
    for item in &document.line_items {
        if layout.reserve(1) {
            layout.line(Font::Regular, 8.0, &format!("{} (continued)", document.reference));
            table_header(&mut layout);
        }
        layout.text(Font::Regular, 10.0, MARGIN, &truncate(&item.description));
        layout.text(Font::Regular, 10.0, COL_QTY, &item.quantity.to_string());
        layout.text_right(
            Font::Regular,
            10.0,
            COL_UNIT_RIGHT,
            &currency.format(item.unit_price),
        );
        layout.text_right(
            Font::Regular,
            10.0,
            COL_AMOUNT_RIGHT,
            &currency.format(item.amount()),
        );
        layout.advance(1.0);
    }

    // Totals
    layout.reserve(4);
    layout.rule();
    layout.advance(0.5);
    let rows = [
        (Font::Regular, "Subtotal".to_string(), totals.subtotal),
        (Font::Regular, format!("Tax ({})", document.tax_rate), totals.tax),
        (Font::Bold, "Total".to_string(), totals.total),
    ];
    for (font, label, amount) in rows {
        layout.text(font, 10.0, COL_QTY, &label);
        layout.text_right(font, 10.0, COL_AMOUNT_RIGHT, &currency.format(amount));
        layout.advance(1.0);
    }
    layout.advance(1.0);

    if let Some(terms) = &document.terms {
        layout.reserve(2);
        layout.line(Font::Bold, 11.0, "Terms");
        for line in wrap(terms, WRAP_CHARS) {
            layout.line(Font::Regular, 9.0, &line);
        }
        layout.advance(1.0);
    }

    if document.kind != DocumentKind::Invoice {
        layout.reserve(2);
        layout.line(Font::Bold, 11.0, "Acceptance");
        match &document.signature {
            Some(sig) => layout.line(
                Font::Regular,
                10.0,
                &format!(
                    "Accepted by {} on {}",
                    sig.signer_name,
                    sig.accepted_at.format("%-d %B %Y at %H:%M UTC")
                ),
            ),
            None => layout.line(Font::Regular, 10.0, "Awaiting signature"),
        }
    } else if let Some(paid) = document.paid_payment() {
        layout.reserve(2);
        layout.line(Font::Bold, 11.0, "Payment");
        let amount = paid.amount_captured.unwrap_or(paid.amount_expected);
        let when = paid
            .paid_at
            .map(|at| format!(" on {}", at.format("%-d %B %Y")))
            .unwrap_or_default();
        layout.line(
            Font::Regular,
            10.0,
            &format!("Paid {}{when}", currency.format(amount)),
        );
    }

    // Footers need the final page count.
    let count = layout.pages.len();
    let generated = options.generated_at.format("%Y-%m-%d %H:%M UTC").to_string();
    for (i, ops) in layout.pages.iter_mut().enumerate() {
        let footer = format!("Generated {generated}  |  Page {} of {count}", i + 1);
        push_text(ops, Font::Regular, 8.0, MARGIN, 40.0, &footer);
    }

    let bytes = assemble(document, options, layout.pages)?;
    tracing::debug!(document_id = %document.id, pages = count, bytes = bytes.len(), "rendered pdf");
    Ok(bytes)
}

fn push_text(ops: &mut Vec<Operation>, font: Font, size: f32, x: f32, y: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![font.resource().into(), size.into()],
    ));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn table_header(layout: &mut Layout) {
    layout.reserve(2);
    layout.text(Font::Bold, 10.0, MARGIN, "Description");
    layout.text(Font::Bold, 10.0, COL_QTY, "Qty");
    layout.text_right(Font::Bold, 10.0, COL_UNIT_RIGHT, "Unit price");
    layout.text_right(Font::Bold, 10.0, COL_AMOUNT_RIGHT, "Amount");
    layout.advance(1.0);
    layout.rule();
    layout.advance(0.3);
}

fn assemble(
    document: &Document,
    options: &RenderOptions,
    pages: Vec<Vec<Operation>>,
) -> Result<Vec<u8>, RenderError> {
    let mut pdf = lopdf::Document::with_version("1.5");
    let pages_id: ObjectId = pdf.new_object_id();

    let regular = pdf.add_object(type1("Helvetica"));
    let bold = pdf.add_object(type1("Helvetica-Bold"));
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let encoded = content.encode().map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    pdf.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = pdf.add_object(dictionary! {
        "Title" => literal(&format!("{} {}", document.kind.label(), document.reference)),
        "Author" => literal(&options.agency_name),
        "Producer" => literal("folio"),
        "CreationDate" => literal(&options.generated_at.format("D:%Y%m%d%H%M%SZ").to_string()),
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.trailer.set("Info", info_id);

    let mut out = Vec::new();
    pdf.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

fn type1(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn literal(text: &str) -> Object {
    Object::String(win_ansi(text), StringFormat::Literal)
}

/// Encode text for a WinAnsi Type1 font. Characters outside the code page
/// become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            c if c.is_control() => b' ',
            _ => b'?',
        })
        .collect()
}

/// Approximate Helvetica advance width, good enough to right-align numbers.
fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            '.' | ',' | ' ' | 'i' | 'l' | 'I' => 278,
            '-' => 333,
            'm' | 'M' | 'W' => 833,
            'A'..='Z' => 667,
            _ => 556,
        })
        .sum();
    units as f32 * size / 1000.0
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(DESCRIPTION_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width
            {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}
