use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};

use crate::error::GradeError;
use crate::structs::grading::GradingResult;
use crate::utils::wrap_text;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const BOTTOM: f32 = 20.0;
const WRAP_CHARS: usize = 90;

/// 报告抬头所需的信息
pub struct ReportHeader<'a> {
    pub title: &'a str,
    pub student_name: &'a str,
    pub student_id: &'a str,
    pub date: &'a str,
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

// 逐行向下书写，空间不够时自动翻页
struct Writer {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Writer {
    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - BOTTOM;
        }
    }

    fn text(&mut self, text: &str, size: f32, font: &IndirectFontRef, height: f32) {
        self.ensure_space(height);
        self.y -= height;
        self.layer.use_text(pdf_safe(text), size, Mm(MARGIN), Mm(self.y), font);
    }

    // 按字数估算宽度后右对齐
    fn text_right(&mut self, text: &str, size: f32, font: &IndirectFontRef, height: f32) {
        self.ensure_space(height);
        self.y -= height;
        let width_mm = text.chars().count() as f32 * size * 0.55 * 0.3528;
        let x = (PAGE_WIDTH - MARGIN - width_mm).max(MARGIN);
        self.layer.use_text(pdf_safe(text), size, Mm(x), Mm(self.y), font);
    }

    fn wrapped(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.text(&line, size, font, 6.0);
        }
    }

    fn rule(&mut self) {
        self.ensure_space(4.0);
        self.y -= 3.0;
        let line = Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(self.y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(self.y)), false),
            ],
            is_closed: false,
        };
        self.layer.add_line(line);
    }
}

/// 生成固定版式的成绩报告
pub fn render_report(
    header: &ReportHeader,
    grading: &GradingResult,
    total_score: f64,
) -> Result<Vec<u8>, GradeError> {
    let (doc, page, layer) =
        PdfDocument::new(pdf_safe(header.title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = |f: BuiltinFont| doc.add_builtin_font(f).map_err(|e| GradeError::Pdf(e.to_string()));
    let fonts = Fonts {
        regular: font(BuiltinFont::Helvetica)?,
        bold: font(BuiltinFont::HelveticaBold)?,
        italic: font(BuiltinFont::HelveticaOblique)?,
    };
    let layer = doc.get_page(page).get_layer(layer);
    let mut writer = Writer {
        doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
    };

    // 标题居中
    let title_width = header.title.chars().count() as f32 * 12.0 * 0.5 * 0.3528;
    writer.y -= 10.0;
    writer.layer.use_text(
        pdf_safe(header.title),
        12.0,
        Mm(((PAGE_WIDTH - title_width) / 2.0).max(MARGIN)),
        Mm(writer.y),
        &fonts.regular,
    );
    writer.text(&format!("Student: {}", header.student_name), 12.0, &fonts.regular, 10.0);
    writer.text(&format!("ID: {}", header.student_id), 12.0, &fonts.regular, 8.0);
    writer.text(&format!("Date: {}", header.date), 12.0, &fonts.regular, 8.0);
    writer.rule();
    writer.y -= 4.0;

    for item in &grading.details {
        writer.text(
            &format!("Question {} - Score: {}/5", item.question, item.score),
            12.0,
            &fonts.bold,
            10.0,
        );
        writer.wrapped(&format!("Feedback: {}", item.feedback), 11.0, &fonts.regular);
        writer.y -= 2.0;
    }

    writer.rule();
    writer.text_right(&format!("FINAL GRADE: {} / 20", total_score), 14.0, &fonts.bold, 15.0);
    writer.wrapped(
        &format!("General recommendation: {}", grading.final_comment),
        11.0,
        &fonts.italic,
    );

    writer.doc.save_to_bytes().map_err(|e| GradeError::Pdf(e.to_string()))
}

/// 内置字体只能显示ASCII，带重音的拉丁字母去掉重音，其他字符替换为?
pub fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c,
            '\t' => ' ',
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            '¿' | '¡' => ' ',
            '–' | '—' => '-',
            '‘' | '’' => '\'',
            '“' | '”' => '"',
            _ => '?',
        })
        .collect()
}
