//! Integration tests for invoice highlighting

use invoice_highlighter::detector::{get_document_title, DetectionConfig};
use invoice_highlighter::rows::build_document_rows;
use invoice_highlighter::{
    build_rows, extract_keeper_name, extract_words_mem, highlight_invoice, highlight_invoice_mem,
    plan_highlights, segment_line_items, Color, ColorAssigner, Dialect, HighlightError,
    HighlightOptions, KeeperKey, MarkTarget, PageGeometry, PageWords, Platform, RegionComputer,
    Word, PALETTE,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

// Helper to create test Words with a fixed glyph width
fn make_word(text: &str, x0: f32, top: f32, page: u32) -> Word {
    let width = text.len() as f32 * 6.0;
    Word::new(text, x0, x0 + width, top, top + 12.0, page)
}

/// Words of a line, tokens separated by one glyph width
fn make_line(text: &str, x0: f32, top: f32, page: u32) -> Vec<Word> {
    let mut words = Vec::new();
    let mut x = x0;
    for token in text.split_whitespace() {
        let word = make_word(token, x, top, page);
        x = word.x1 + 6.0;
        words.push(word);
    }
    words
}

fn make_page(page: u32, lines: &[(&str, f32, f32)]) -> PageWords {
    PageWords {
        page,
        geometry: PageGeometry::LETTER,
        words: lines
            .iter()
            .flat_map(|&(text, x0, top)| make_line(text, x0, top, page))
            .collect(),
    }
}

/// Build a PDF whose pages show the given lines in 12pt Helvetica.
///
/// Each line is `(x, top, text)` with `top` measured from the top of a
/// US Letter page.
fn build_pdf(pages: &[Vec<(f32, f32, &str)>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for &(x, top, text) in lines {
            // Baseline sits 0.8 of the font size below the glyph top
            let baseline = 792.0 - top - 9.6;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![x.into(), baseline.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// (page, subtype, color) of every annotation in a document
fn annotations(pdf: &[u8]) -> Vec<(u32, String, Vec<f32>)> {
    let doc = Document::load_mem(pdf).unwrap();
    let mut found = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id).unwrap();
        let Ok(annots) = page.get(b"Annots") else {
            continue;
        };
        let annots = match annots {
            Object::Reference(id) => doc.get_object(*id).unwrap().as_array().unwrap(),
            other => other.as_array().unwrap(),
        };
        for annot in annots {
            let dict = doc.get_dictionary(annot.as_reference().unwrap()).unwrap();
            let subtype = String::from_utf8_lossy(dict.get(b"Subtype").unwrap().as_name().unwrap())
                .to_string();
            let color = dict
                .get(b"C")
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|o| o.as_float().unwrap())
                .collect();
            found.push((page_num, subtype, color));
        }
    }
    found
}

fn rgb(color: Color) -> Vec<f32> {
    color.components().to_vec()
}

fn one_item_invoice() -> Vec<Vec<(f32, f32, &'static str)>> {
    vec![vec![
        (40.0, 100.0, "1 01/01/2024 John Smith A104 Travel to court"),
        (40.0, 120.0, "Adjustments and Credit"),
        (40.0, 140.0, "-50.00 Courtesy discount"),
        (40.0, 160.0, "2 01/02/2024 Jane Doe A105 Draft motion"),
    ]]
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_default_options() {
    let options = HighlightOptions::default();
    assert_eq!(options.platform, Platform::Standard);
    assert_eq!(options.padding, 0.0);
    assert_eq!(options.max_input_bytes, 10 * 1024 * 1024);
    assert!(options.opacity.is_none());
    assert!(options.title.is_none());

    let detection = DetectionConfig::default();
    assert_eq!(detection.max_pages_to_sample, 5);
}

#[test]
fn test_platform_selection() {
    assert_eq!("Standard".parse::<Platform>().unwrap(), Platform::Standard);
    assert_eq!("counsel-link".parse::<Platform>().unwrap(), Platform::CounselLink);
    assert!(matches!(
        "ebilling-hub".parse::<Platform>(),
        Err(HighlightError::NotImplemented(_))
    ));
    assert!(matches!(
        Platform::CounselLink.dialect(),
        Err(HighlightError::NotImplemented(_))
    ));
}

#[test]
fn test_custom_dialect_bad_pattern() {
    let result = Dialect::new("broken", r"^\s*(\d+", "Adjustments", r"\d+", r"[A-Z]\d{3}");
    assert!(matches!(result, Err(HighlightError::InvalidPattern(_))));
}

// ============================================================================
// Word Extraction Tests
// ============================================================================

#[test]
fn test_extract_words_from_generated_pdf() {
    let pdf = build_pdf(&[vec![(40.0, 100.0, "1 01/01/2024 John Smith A104")]]);
    let pages = extract_words_mem(&pdf).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page, 1);
    assert_eq!(pages[0].geometry, PageGeometry::LETTER);

    let texts: Vec<&str> = pages[0].words.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(texts, vec!["1", "01/01/2024", "John", "Smith", "A104"]);

    let first = &pages[0].words[0];
    assert!((first.x0 - 40.0).abs() < 0.01);
    assert!((first.top - 100.0).abs() < 0.01);
    assert!((first.bottom - 112.0).abs() < 0.01);
}

#[test]
fn test_rows_from_generated_pdf() {
    let pdf = build_pdf(&one_item_invoice());
    let pages = extract_words_mem(&pdf).unwrap();
    let rows = build_rows(&pages[0].words, 2.0);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1].text(), "Adjustments and Credit");
}

// ============================================================================
// Segmentation and Name Extraction Tests
// ============================================================================

#[test]
fn test_scenario_single_item_with_adjustments() {
    let pages = vec![make_page(
        1,
        &[
            ("1 01/01/2024 John Smith A104 Travel", 40.0, 100.0),
            ("Adjustments and Credit", 40.0, 115.0),
            ("-50.00 Credit applied", 40.0, 130.0),
            ("2 01/02/2024 Jane Doe A105 Review", 40.0, 145.0),
        ],
    )];
    let dialect = Dialect::standard();
    let rows = build_document_rows(&pages, dialect.row_tolerance);
    let items = segment_line_items(&rows, &dialect);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].keeper_rows.len(), 1);
    assert_eq!(items[0].ac_rows.len(), 1);
    assert_eq!(items[0].ac_rows[0].text(), "-50.00 Credit applied");

    let name = extract_keeper_name(&items[0], &dialect);
    assert!(!name.degraded);
    assert_eq!(name.key().as_str(), "john smith");
}

#[test]
fn test_item_without_adjustments_is_dropped() {
    let pages = vec![make_page(
        1,
        &[
            ("1 01/01/2024 John Smith A104 Travel", 40.0, 100.0),
            ("continued description", 40.0, 115.0),
            ("2 01/02/2024 Jane Doe A105 Review", 40.0, 130.0),
        ],
    )];
    let dialect = Dialect::standard();
    let rows = build_document_rows(&pages, dialect.row_tolerance);
    assert!(segment_line_items(&rows, &dialect).is_empty());
}

#[test]
fn test_wrapped_name_continuation() {
    // "Smith" wraps to the next row, aligned with "John"
    let header = make_line("1 01/01/2024 John A104 Travel", 40.0, 100.0, 1);
    let john_x0 = header[2].x0;
    let mut words = header;
    words.push(make_word("Smith", john_x0 + 1.0, 115.0, 1));
    words.push(make_word("time", 300.0, 115.0, 1));
    words.extend(make_line("Adjustments and Credit", 40.0, 130.0, 1));
    words.extend(make_line("-10.00", 40.0, 145.0, 1));

    let pages = vec![PageWords {
        page: 1,
        geometry: PageGeometry::LETTER,
        words,
    }];
    let dialect = Dialect::standard();
    let rows = build_document_rows(&pages, dialect.row_tolerance);
    let items = segment_line_items(&rows, &dialect);
    assert_eq!(items.len(), 1);

    let name = extract_keeper_name(&items[0], &dialect);
    let texts: Vec<&str> = name.words.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(texts, vec!["John", "Smith"]);
}

#[test]
fn test_expense_terminates_name() {
    let pages = vec![make_page(
        1,
        &[
            ("3 02/11/2024 Mary Ann Lee Expense Filing fee", 40.0, 100.0),
            ("Adjustments and Credit", 40.0, 115.0),
            ("-15.00 Fee waived", 40.0, 130.0),
        ],
    )];
    let dialect = Dialect::standard();
    let rows = build_document_rows(&pages, dialect.row_tolerance);
    let items = segment_line_items(&rows, &dialect);
    let name = extract_keeper_name(&items[0], &dialect);
    assert_eq!(name.key().as_str(), "mary ann lee");
}

// ============================================================================
// Color Assignment Tests
// ============================================================================

#[test]
fn test_keeper_key_normalization() {
    let a = KeeperKey::from_tokens(["John", "Smith,"]);
    let b = KeeperKey::from_tokens(["JOHN", "smith"]);
    assert_eq!(a, b);

    let mut colors = ColorAssigner::new();
    assert_eq!(colors.assign(&a), colors.assign(&b));
    assert_eq!(colors.len(), 1);
}

#[test]
fn test_palette_wraps_after_six_keepers() {
    let mut colors = ColorAssigner::new();
    let assigned: Vec<Color> = (0..7)
        .map(|i| colors.assign(&KeeperKey::from_tokens([format!("keeper{}", i).as_str()])))
        .collect();
    assert_eq!(&assigned[..6], &PALETTE[..]);
    assert_eq!(assigned[6], PALETTE[0]);
}

// ============================================================================
// Planning Tests
// ============================================================================

#[test]
fn test_plan_same_keeper_same_color_across_pages() {
    let pages = vec![
        make_page(
            1,
            &[
                ("1 01/01/2024 John Smith A104 Travel", 40.0, 100.0),
                ("Adjustments and Credit", 40.0, 115.0),
                ("-50.00 Credit applied", 40.0, 130.0),
                ("2 01/02/2024 Jane Doe A105 Review", 40.0, 145.0),
                ("Adjustments and Credit", 40.0, 160.0),
                ("-20.00 Credit applied", 40.0, 175.0),
            ],
        ),
        make_page(
            2,
            &[
                ("3 01/03/2024 john smith, A104 Call", 40.0, 60.0),
                ("Adjustments and Credit", 40.0, 75.0),
                ("-5.00 Rounding", 40.0, 90.0),
            ],
        ),
    ];
    let plan = plan_highlights(&pages, &Dialect::standard(), &RegionComputer::default());

    assert_eq!(plan.items.len(), 3);
    assert_eq!(plan.keepers.len(), 2);
    assert_eq!(plan.keepers[0].1, PALETTE[0]);
    assert_eq!(plan.keepers[1].1, PALETTE[1]);

    let john: Vec<Color> = plan
        .marks
        .iter()
        .filter(|m| m.keeper.as_str() == "john smith")
        .map(|m| m.color)
        .collect();
    assert_eq!(john.len(), 4);
    assert!(john.iter().all(|&c| c == PALETTE[0]));
}

#[test]
fn test_plan_is_deterministic() {
    let pages = vec![make_page(
        1,
        &[
            ("1 01/01/2024 John Smith A104 Travel", 40.0, 100.0),
            ("Adjustments and Credit", 40.0, 115.0),
            ("-50.00 Credit applied", 40.0, 130.0),
            ("2 01/02/2024 Jane Doe A105 Review", 40.0, 145.0),
            ("Adjustments and Credit", 40.0, 160.0),
            ("-20.00 Credit applied", 40.0, 175.0),
        ],
    )];
    let dialect = Dialect::standard();
    let first = plan_highlights(&pages, &dialect, &RegionComputer::default());
    let second = plan_highlights(&pages, &dialect, &RegionComputer::default());
    assert_eq!(first.marks, second.marks);
    assert_eq!(first.keepers, second.keepers);
}

#[test]
fn test_plan_mark_order() {
    let pages = vec![make_page(
        1,
        &[
            ("1 01/01/2024 John Smith A104 Travel", 40.0, 100.0),
            ("Adjustments and Credit", 40.0, 115.0),
            ("-50.00 Credit applied", 40.0, 130.0),
        ],
    )];
    let plan = plan_highlights(&pages, &Dialect::standard(), &RegionComputer::default());
    let targets: Vec<MarkTarget> = plan.marks.iter().map(|m| m.target).collect();
    assert_eq!(targets, vec![MarkTarget::KeeperName, MarkTarget::AdjustmentBlock]);
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[test]
fn test_highlight_single_item() {
    let pdf = build_pdf(&one_item_invoice());
    let output = highlight_invoice_mem(&pdf, &HighlightOptions::default()).unwrap();

    assert_eq!(output.report.page_count, 1);
    assert_eq!(output.report.line_items, 1);
    assert_eq!(output.report.highlights, 2);
    assert_eq!(output.report.outline_fallbacks, 0);
    assert_eq!(output.report.keepers.len(), 1);
    assert_eq!(output.report.keepers[0].0.as_str(), "john smith");

    let annots = annotations(&output.pdf);
    assert_eq!(annots.len(), 2);
    for (page, subtype, color) in &annots {
        assert_eq!(*page, 1);
        assert_eq!(subtype, "Highlight");
        for (got, want) in color.iter().zip(rgb(PALETTE[0])) {
            assert!((got - want).abs() < 0.001);
        }
    }
}

#[test]
fn test_highlight_keeper_colors_across_pages() {
    let pdf = build_pdf(&[
        vec![
            (40.0, 100.0, "1 01/01/2024 John Smith A104 Travel"),
            (40.0, 120.0, "Adjustments and Credit"),
            (40.0, 140.0, "-50.00 Courtesy discount"),
            (40.0, 160.0, "2 01/02/2024 Jane Doe A105 Review"),
            (40.0, 180.0, "Adjustments and Credit"),
            (40.0, 200.0, "-20.00 Courtesy discount"),
        ],
        vec![
            (40.0, 80.0, "3 01/03/2024 John Smith A106 Call"),
            (40.0, 100.0, "Adjustments and Credit"),
            (40.0, 120.0, "-25.00 Write down"),
        ],
    ]);
    let output = highlight_invoice_mem(&pdf, &HighlightOptions::default()).unwrap();
    assert_eq!(output.report.line_items, 3);
    assert_eq!(output.report.highlights, 6);

    let annots = annotations(&output.pdf);
    let page2: Vec<&Vec<f32>> = annots
        .iter()
        .filter(|(page, _, _)| *page == 2)
        .map(|(_, _, color)| color)
        .collect();
    assert_eq!(page2.len(), 2);
    for color in page2 {
        for (got, want) in color.iter().zip(rgb(PALETTE[0])) {
            assert!((got - want).abs() < 0.001);
        }
    }
}

#[test]
fn test_highlight_skips_off_page_adjustment_block() {
    let pdf = build_pdf(&[vec![
        (40.0, 100.0, "1 01/01/2024 John Smith A104 Travel"),
        (40.0, 120.0, "Adjustments and Credit"),
        (700.0, 140.0, "-50.00 Courtesy"),
        (40.0, 160.0, "2 01/02/2024 Jane Doe A105 Review"),
    ]]);
    let output = highlight_invoice_mem(&pdf, &HighlightOptions::default()).unwrap();

    assert_eq!(output.report.line_items, 1);
    assert_eq!(output.report.skipped_regions, 1);
    assert_eq!(output.report.highlights, 1);
    assert_eq!(output.report.outline_fallbacks, 0);
    assert_eq!(annotations(&output.pdf).len(), 1);
}

#[test]
fn test_highlight_no_adjustments_leaves_document_unmarked() {
    let pdf = build_pdf(&[vec![
        (40.0, 100.0, "1 01/01/2024 John Smith A104 Travel"),
        (40.0, 120.0, "2 01/02/2024 Jane Doe A105 Review"),
        (40.0, 140.0, "Total 1,250.00"),
    ]]);
    let output = highlight_invoice_mem(&pdf, &HighlightOptions::default()).unwrap();
    assert_eq!(output.report.line_items, 0);
    assert_eq!(output.report.highlights, 0);
    assert!(annotations(&output.pdf).is_empty());
}

#[test]
fn test_highlight_opacity_override() {
    let pdf = build_pdf(&one_item_invoice());
    let options = HighlightOptions {
        opacity: Some(0.4),
        ..Default::default()
    };
    let output = highlight_invoice_mem(&pdf, &options).unwrap();
    let doc = Document::load_mem(&output.pdf).unwrap();
    let with_ca = doc
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| matches!(d.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Highlight"))
        .filter(|d| {
            d.get(b"CA")
                .ok()
                .and_then(|ca| ca.as_float().ok())
                .is_some_and(|ca| (ca - 0.4).abs() < 0.001)
        })
        .count();
    assert_eq!(with_ca, 2);
}

#[test]
fn test_rerun_adds_highlights_again() {
    let pdf = build_pdf(&one_item_invoice());
    let options = HighlightOptions::default();
    let first = highlight_invoice_mem(&pdf, &options).unwrap();
    let second = highlight_invoice_mem(&first.pdf, &options).unwrap();
    assert_eq!(second.report.highlights, 2);
    assert_eq!(annotations(&second.pdf).len(), 4);
}

#[test]
fn test_highlight_file_roundtrip_with_title() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("invoice.pdf");
    let output = dir.path().join("invoice.highlighted.pdf");
    std::fs::write(&input, build_pdf(&one_item_invoice())).unwrap();

    let options = HighlightOptions {
        title: Some("Highlighted invoice".to_string()),
        ..Default::default()
    };
    let report = highlight_invoice(&input, &output, &options).unwrap();
    assert_eq!(report.highlights, 2);
    assert!(output.exists());

    let doc = Document::load(&output).unwrap();
    assert_eq!(
        get_document_title(&doc).as_deref(),
        Some("Highlighted invoice")
    );
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_counsellink_not_implemented() {
    let pdf = build_pdf(&one_item_invoice());
    let options = HighlightOptions {
        platform: Platform::CounselLink,
        ..Default::default()
    };
    assert!(matches!(
        highlight_invoice_mem(&pdf, &options),
        Err(HighlightError::NotImplemented(_))
    ));
}

#[test]
fn test_rejects_non_pdf_input() {
    let result = highlight_invoice_mem(b"<html>not a pdf</html>", &HighlightOptions::default());
    assert!(matches!(result, Err(HighlightError::InvalidInput(_))));
}

#[test]
fn test_rejects_oversized_input() {
    let pdf = build_pdf(&one_item_invoice());
    let options = HighlightOptions {
        max_input_bytes: 64,
        ..Default::default()
    };
    assert!(matches!(
        highlight_invoice_mem(&pdf, &options),
        Err(HighlightError::InvalidInput(_))
    ));
}

#[test]
fn test_rejects_document_without_text() {
    let pdf = build_pdf(&[vec![], vec![]]);
    assert!(matches!(
        highlight_invoice_mem(&pdf, &HighlightOptions::default()),
        Err(HighlightError::NoTextLayer(_))
    ));
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = highlight_invoice(
        dir.path().join("missing.pdf"),
        dir.path().join("out.pdf"),
        &HighlightOptions::default(),
    );
    assert!(matches!(result, Err(HighlightError::Io(_))));
}
