//! MRZ parser & check-digit engine (C2).
//!
//! A strict fixed-column parser for the three ICAO 9303 travel-document
//! formats (TD1/TD2/TD3). Every check digit is validated during parsing;
//! a document whose check digits do not match never produces a record.

use crate::error::{CheckDigitField, Error, Result};

/// Which of the three ICAO shapes a record was parsed from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MrzFormat {
    Td1,
    Td2,
    Td3,
}

/// An immutable, fully check-digit-validated MRZ record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MrzRecord {
    pub format: MrzFormat,
    pub document_type: String,
    pub issuer: String,
    pub primary_identifier: String,
    pub secondary_identifier: Option<String>,
    pub name_might_be_truncated: bool,
    pub document_number: String,
    pub holder_nationality: String,
    /// 6-character YYMMDD, never trimmed.
    pub date_of_birth: String,
    pub sex: char,
    /// 6-character YYMMDD, never trimmed.
    pub date_of_expiry: String,
    pub optional_data_1: String,
    pub optional_data_2: Option<String>,
}

impl MrzRecord {
    /// The string BAC derives `K_seed` from: the 9-column document number
    /// (padded with filler), its check digit, date of birth and check
    /// digit, date of expiry and check digit. BAC is only ever run against
    /// TD3-shaped MRZs in practice, so `document_number` here is assumed to
    /// already fit the 9-column field (no TD1/TD2 extended-number case).
    pub fn bac_seed_string(&self) -> Result<String> {
        let mut doc = self.document_number.clone();
        while doc.chars().count() < 9 {
            doc.push('<');
        }
        let doc_check = check_digit(&doc)?;
        let dob_check = check_digit(&self.date_of_birth)?;
        let exp_check = check_digit(&self.date_of_expiry)?;
        Ok(format!(
            "{doc}{doc_check}{}{dob_check}{}{exp_check}",
            self.date_of_birth, self.date_of_expiry
        ))
    }
}

/// Lookup table mapping the check-digit alphabet (`<` -> 0, `0-9` -> 0-9,
/// `A-Z` -> 10-35) by ASCII byte value, built once at compile time rather
/// than a branch cascade.
const fn build_alphabet() -> [i8; 256] {
    let mut table = [-1i8; 256];
    table[b'<' as usize] = 0;
    let mut d = 0u8;
    while d < 10 {
        table[(b'0' + d) as usize] = d as i8;
        d += 1;
    }
    let mut l = 0u8;
    while l < 26 {
        table[(b'A' + l) as usize] = 10 + l as i8;
        l += 1;
    }
    table
}

static CHECK_DIGIT_ALPHABET: [i8; 256] = build_alphabet();

fn char_value(c: char) -> Result<u8> {
    if !c.is_ascii() {
        return Err(Error::UnknownCharacter { c });
    }
    let v = CHECK_DIGIT_ALPHABET[c as usize];
    if v < 0 {
        return Err(Error::UnknownCharacter { c });
    }
    Ok(v as u8)
}

/// Parse a digit embedded in an MRZ check-digit column. Check-digit columns
/// are always plain decimal digits; anything else is a malformed document.
fn read_check_digit(c: char) -> Result<u8> {
    c.to_digit(10)
        .map(|d| d as u8)
        .ok_or(Error::UnknownCharacter { c })
}

/// The sole check-digit primitive: weights `[7, 3, 1]` cycled over `s`,
/// values from the check-digit alphabet, summed mod 10. Used both for MRZ
/// validation and for BAC key derivation.
pub fn check_digit(s: &str) -> Result<u8> {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let mut sum: u32 = 0;
    for (i, c) in s.chars().enumerate() {
        sum += char_value(c)? as u32 * WEIGHTS[i % 3];
    }
    Ok((sum % 10) as u8)
}

fn right_trim(s: &str) -> String {
    s.trim_end_matches('<').to_string()
}

fn verify(which: CheckDigitField, read: u8, computed: u8) -> Result<()> {
    if read == computed {
        Ok(())
    } else {
        Err(Error::BadCheckDigit {
            which,
            read,
            computed,
        })
    }
}

/// The three fields an extended (overlong) TD1/TD2 document number
/// resolves to; see the module-level design note on the continuation rule.
struct ExtendedDocNumber {
    document_number: String,
    check_digit: u8,
    optional_data_1: String,
}

/// Resolve a document number field that may be "overlong": `base9` is the
/// fixed 9-column field, `check_col` the column immediately following it,
/// and `region` the fixed-width field that follows (TD1: the rest of the
/// top line; TD2: the fixed optional-data-1 columns on the bottom line).
fn resolve_document_number(base9: &str, check_col: char, region: &str) -> Result<ExtendedDocNumber> {
    if check_col != '<' {
        return Ok(ExtendedDocNumber {
            document_number: base9.to_string(),
            check_digit: read_check_digit(check_col)?,
            optional_data_1: right_trim(region),
        });
    }

    let region_chars: Vec<char> = region.chars().collect();
    let filler_pos = region_chars.iter().position(|&c| c == '<');

    match filler_pos {
        Some(p) if p >= 1 => {
            let check = read_check_digit(region_chars[p - 1])?;
            let continuation: String = region_chars[..p - 1].iter().collect();
            let remainder: String = if p + 1 <= region_chars.len() {
                region_chars[p + 1..].iter().collect()
            } else {
                String::new()
            };
            Ok(ExtendedDocNumber {
                document_number: format!("{base9}{continuation}"),
                check_digit: check,
                optional_data_1: right_trim(&remainder),
            })
        }
        // No terminating filler (or a filler in the very first column, which
        // leaves no character to serve as a check digit): the number
        // extends to the penultimate column of the region.
        _ => {
            if region_chars.is_empty() {
                return Ok(ExtendedDocNumber {
                    document_number: base9.to_string(),
                    check_digit: 0,
                    optional_data_1: String::new(),
                });
            }
            let last = region_chars.len() - 1;
            let check = read_check_digit(region_chars[last])?;
            let continuation: String = region_chars[..last].iter().collect();
            Ok(ExtendedDocNumber {
                document_number: format!("{base9}{continuation}"),
                check_digit: check,
                optional_data_1: String::new(),
            })
        }
    }
}

/// Split a fixed-width name field on the first `<<` into primary and
/// (optional) secondary identifiers. Internal single `<` in the secondary
/// identifier is preserved literally (e.g. `ANNA<MARIA`), not converted to
/// a space.
fn split_name(name_field: &str) -> (String, Option<String>, bool) {
    let might_be_truncated = !name_field.ends_with('<');
    match name_field.find("<<") {
        Some(pos) => {
            let primary = right_trim(&name_field[..pos]);
            let secondary = right_trim(&name_field[pos + 2..]);
            (primary, Some(secondary), might_be_truncated)
        }
        None => (right_trim(name_field), None, might_be_truncated),
    }
}

/// Parse MRZ text: split on `\n`, trim each line, drop blank lines, then
/// dispatch purely on `(line_count, line_length)`.
pub fn parse(text: &str) -> Result<MrzRecord> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(Error::UnknownFormat);
    }
    let width = lines[0].chars().count();
    if !lines.iter().all(|l| l.chars().count() == width) {
        return Err(Error::UnknownFormat);
    }

    match (lines.len(), width) {
        (2, 44) => parse_td3(lines[0], lines[1]),
        (3, 30) => parse_td1(lines[0], lines[1], lines[2]),
        (2, 36) => parse_td2(lines[0], lines[1]),
        _ => Err(Error::UnknownFormat),
    }
}

fn parse_td3(top: &str, bottom: &str) -> Result<MrzRecord> {
    let document_type = right_trim(&top[0..2]);
    let issuer = right_trim(&top[2..5]);
    let (primary_identifier, secondary_identifier, name_might_be_truncated) =
        split_name(&top[5..44]);

    let document_number = right_trim(&bottom[0..9]);
    let document_number_check = read_check_digit(bottom.chars().nth(9).unwrap())?;
    verify(
        CheckDigitField::DocumentNumber,
        document_number_check,
        check_digit(&document_number)?,
    )?;

    let holder_nationality = right_trim(&bottom[10..13]);
    let date_of_birth = bottom[13..19].to_string();
    let dob_check = read_check_digit(bottom.chars().nth(19).unwrap())?;
    verify(
        CheckDigitField::DateOfBirth,
        dob_check,
        check_digit(&date_of_birth)?,
    )?;

    let sex = bottom.chars().nth(20).unwrap();
    let date_of_expiry = bottom[21..27].to_string();
    let expiry_check = read_check_digit(bottom.chars().nth(27).unwrap())?;
    verify(
        CheckDigitField::DateOfExpiry,
        expiry_check,
        check_digit(&date_of_expiry)?,
    )?;

    let optional_data_1_raw = &bottom[28..42];
    let optional_data_1 = right_trim(optional_data_1_raw);
    let optional_data_1_check_col = bottom.chars().nth(42).unwrap();
    if optional_data_1_check_col != '<' {
        let read = read_check_digit(optional_data_1_check_col)?;
        verify(
            CheckDigitField::OptionalData1,
            read,
            check_digit(&optional_data_1)?,
        )?;
    }

    let composite_input = format!("{}{}{}", &bottom[0..10], &bottom[13..20], &bottom[21..43]);
    let composite_check = read_check_digit(bottom.chars().nth(43).unwrap())?;
    verify(
        CheckDigitField::Composite,
        composite_check,
        check_digit(&composite_input)?,
    )?;

    Ok(MrzRecord {
        format: MrzFormat::Td3,
        document_type,
        issuer,
        primary_identifier,
        secondary_identifier,
        name_might_be_truncated,
        document_number,
        holder_nationality,
        date_of_birth,
        sex,
        date_of_expiry,
        optional_data_1,
        optional_data_2: None,
    })
}

fn parse_td1(top: &str, middle: &str, bottom: &str) -> Result<MrzRecord> {
    let document_type = right_trim(&top[0..2]);
    let issuer = right_trim(&top[2..5]);

    let base9 = &top[5..14];
    let check_col = top.chars().nth(14).unwrap();
    let region = &top[15..30];
    let extended = resolve_document_number(base9, check_col, region)?;
    verify(
        CheckDigitField::DocumentNumber,
        extended.check_digit,
        check_digit(&extended.document_number)?,
    )?;

    let date_of_birth = middle[0..6].to_string();
    let dob_check = read_check_digit(middle.chars().nth(6).unwrap())?;
    verify(
        CheckDigitField::DateOfBirth,
        dob_check,
        check_digit(&date_of_birth)?,
    )?;

    let sex = middle.chars().nth(7).unwrap();
    let date_of_expiry = middle[8..14].to_string();
    let expiry_check = read_check_digit(middle.chars().nth(14).unwrap())?;
    verify(
        CheckDigitField::DateOfExpiry,
        expiry_check,
        check_digit(&date_of_expiry)?,
    )?;

    let holder_nationality = right_trim(&middle[15..18]);
    let optional_data_2 = right_trim(&middle[18..29]);

    let composite_input = format!(
        "{}{}{}{}",
        &top[5..30],
        &middle[0..7],
        &middle[8..15],
        &middle[18..29]
    );
    let composite_check = read_check_digit(middle.chars().nth(29).unwrap())?;
    verify(
        CheckDigitField::Composite,
        composite_check,
        check_digit(&composite_input)?,
    )?;

    let (primary_identifier, secondary_identifier, name_might_be_truncated) = split_name(bottom);

    Ok(MrzRecord {
        format: MrzFormat::Td1,
        document_type,
        issuer,
        primary_identifier,
        secondary_identifier,
        name_might_be_truncated,
        document_number: extended.document_number,
        holder_nationality,
        date_of_birth,
        sex,
        date_of_expiry,
        optional_data_1: extended.optional_data_1,
        optional_data_2: Some(optional_data_2),
    })
}

fn parse_td2(top: &str, bottom: &str) -> Result<MrzRecord> {
    let document_type = right_trim(&top[0..2]);
    let issuer = right_trim(&top[2..5]);
    let (primary_identifier, secondary_identifier, name_might_be_truncated) =
        split_name(&top[5..36]);

    let base9 = &bottom[0..9];
    let check_col = bottom.chars().nth(9).unwrap();
    let region = &bottom[28..35];
    let extended = resolve_document_number(base9, check_col, region)?;
    verify(
        CheckDigitField::DocumentNumber,
        extended.check_digit,
        check_digit(&extended.document_number)?,
    )?;

    let holder_nationality = right_trim(&bottom[10..13]);
    let date_of_birth = bottom[13..19].to_string();
    let dob_check = read_check_digit(bottom.chars().nth(19).unwrap())?;
    verify(
        CheckDigitField::DateOfBirth,
        dob_check,
        check_digit(&date_of_birth)?,
    )?;

    let sex = bottom.chars().nth(20).unwrap();
    let date_of_expiry = bottom[21..27].to_string();
    let expiry_check = read_check_digit(bottom.chars().nth(27).unwrap())?;
    verify(
        CheckDigitField::DateOfExpiry,
        expiry_check,
        check_digit(&date_of_expiry)?,
    )?;

    let composite_input = format!("{}{}{}", &bottom[0..10], &bottom[13..20], &bottom[21..35]);
    let composite_check = read_check_digit(bottom.chars().nth(35).unwrap())?;
    verify(
        CheckDigitField::Composite,
        composite_check,
        check_digit(&composite_input)?,
    )?;

    Ok(MrzRecord {
        format: MrzFormat::Td2,
        document_type,
        issuer,
        primary_identifier,
        secondary_identifier,
        name_might_be_truncated,
        document_number: extended.document_number,
        holder_nationality,
        date_of_birth,
        sex,
        date_of_expiry,
        optional_data_1: extended.optional_data_1,
        optional_data_2: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_digit_alphabet() {
        assert_eq!(char_value('<').unwrap(), 0);
        assert_eq!(char_value('5').unwrap(), 5);
        assert_eq!(char_value('A').unwrap(), 10);
        assert_eq!(char_value('Z').unwrap(), 35);
        assert!(char_value('_').is_err());
    }

    #[test]
    fn td3_vector() {
        let mrz = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
                   L898902C36UTO7408122F1204159ZE184226B<<<<<10";
        let r = parse(mrz).unwrap();
        assert_eq!(r.format, MrzFormat::Td3);
        assert_eq!(r.document_type, "P");
        assert_eq!(r.issuer, "UTO");
        assert_eq!(r.primary_identifier, "ERIKSSON");
        assert_eq!(r.secondary_identifier.as_deref(), Some("ANNA<MARIA"));
        assert!(!r.name_might_be_truncated);
        assert_eq!(r.document_number, "L898902C3");
        assert_eq!(r.holder_nationality, "UTO");
        assert_eq!(r.date_of_birth, "740812");
        assert_eq!(r.sex, 'F');
        assert_eq!(r.date_of_expiry, "120415");
        assert_eq!(r.optional_data_1, "ZE184226B");
        assert_eq!(r.optional_data_2, None);
    }

    #[test]
    fn td1_vector() {
        let mrz = "I<UTOD231458907<<<<<<<<<<<<<<<\n\
                   7408122F1204159UTO<<<<<<<<<<<6\n\
                   ERIKSSON<<ANNA<MARIA<<<<<<<<<<";
        let r = parse(mrz).unwrap();
        assert_eq!(r.format, MrzFormat::Td1);
        assert_eq!(r.document_number, "D23145890");
        assert_eq!(r.optional_data_1, "");
        assert_eq!(r.optional_data_2.as_deref(), Some(""));
        assert_eq!(r.primary_identifier, "ERIKSSON");
        assert_eq!(r.secondary_identifier.as_deref(), Some("ANNA<MARIA"));
    }

    #[test]
    fn td1_overlong_vector() {
        let mrz = "I<UTOD23145890<7349<SWAG<<<<<<\n\
                   3407127M9507122UTOYOLO<<<<<<<5\n\
                   STEVENSON<<PETER<JOHN<<<<<<<<<";
        let r = parse(mrz).unwrap();
        assert_eq!(r.document_number, "D23145890734");
        assert_eq!(r.optional_data_1, "SWAG");
        assert_eq!(r.optional_data_2.as_deref(), Some("YOLO"));
    }

    #[test]
    fn td2_overlong_vector() {
        let mrz = "I<UTOSTEVENSON<<PETER<JOHN<<<<<<<<<<\n\
                   D23145890<UTO3407127M95071227349<XY9";
        let r = parse(mrz).unwrap();
        assert_eq!(r.format, MrzFormat::Td2);
        assert_eq!(r.document_number, "D23145890734");
        assert_eq!(r.optional_data_1, "XY");
        assert_eq!(r.optional_data_2, None);
    }

    #[test]
    fn unknown_shape_rejected() {
        let err = parse("too short\nalso short").unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));
    }

    #[test]
    fn bad_composite_check_digit_rejected() {
        // Flip the final composite check digit of the TD3 vector.
        let mrz = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
                   L898902C36UTO7408122F1204159ZE184226B<<<<<11";
        let err = parse(mrz).unwrap_err();
        assert!(matches!(
            err,
            Error::BadCheckDigit {
                which: CheckDigitField::Composite,
                ..
            }
        ));
    }

    #[test]
    fn bad_document_number_check_digit_rejected() {
        let mrz = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
                   L898902C37UTO7408122F1204159ZE184226B<<<<<10";
        let err = parse(mrz).unwrap_err();
        assert!(matches!(
            err,
            Error::BadCheckDigit {
                which: CheckDigitField::DocumentNumber,
                ..
            }
        ));
    }

    #[test]
    fn bac_seed_string_matches_icao_example() {
        // ICAO 9303-11 Appendix D.2: document number "L898902C<" prints as
        // "L898902C" once its trailing filler is trimmed; bac_seed_string
        // must pad it back to 9 columns before deriving the check digit.
        let r = MrzRecord {
            format: MrzFormat::Td3,
            document_type: "P".into(),
            issuer: "UTO".into(),
            primary_identifier: "ERIKSSON".into(),
            secondary_identifier: Some("ANNA<MARIA".into()),
            name_might_be_truncated: false,
            document_number: "L898902C".into(),
            holder_nationality: "UTO".into(),
            date_of_birth: "690806".into(),
            sex: 'F',
            date_of_expiry: "940623".into(),
            optional_data_1: String::new(),
            optional_data_2: None,
        };
        assert_eq!(r.bac_seed_string().unwrap(), "L898902C<369080619406236");
    }
}
