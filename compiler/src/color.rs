use std::fmt;

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::number::{format_number, fuzzy_eq};

/// CSS named colors.
pub const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aqua", [0, 255, 255]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("fuchsia", [255, 0, 255]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [128, 128, 128]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("indigo", [75, 0, 130]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("lime", [0, 255, 0]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olive", [128, 128, 0]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [128, 0, 128]),
    ("rebeccapurple", [102, 51, 153]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("silver", [192, 192, 192]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("teal", [0, 128, 128]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

static BY_NAME: Lazy<HashMap<&'static str, [u8; 3]>> =
    Lazy::new(|| NAMED_COLORS.iter().copied().collect());

/// First name listed for each channel triple, so `aqua` wins over `cyan`.
static BY_VALUE: Lazy<HashMap<[u8; 3], &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (name, rgb) in NAMED_COLORS {
        map.entry(*rgb).or_insert(*name);
    }
    map
});

/// An RGBA color. Channels are kept unrounded; `original` preserves the
/// source spelling of literal colors so they print back unchanged.
#[derive(Debug, Clone)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
    pub original: Option<String>,
}

fn clamp(value: f64, max: f64) -> f64 {
    value.clamp(0.0, max)
}

fn hue_to_rgb(m1: f64, m2: f64, mut h: f64) -> f64 {
    if h < 0.0 {
        h += 1.0;
    } else if h > 1.0 {
        h -= 1.0;
    }
    if h * 6.0 < 1.0 {
        m1 + (m2 - m1) * h * 6.0
    } else if h * 2.0 < 1.0 {
        m2
    } else if h * 3.0 < 2.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - h) * 6.0
    } else {
        m1
    }
}

impl Color {
    pub fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Color {
            r: clamp(r, 255.0),
            g: clamp(g, 255.0),
            b: clamp(b, 255.0),
            a: clamp(a, 1.0),
            original: None,
        }
    }

    pub fn from_name(name: &str) -> Option<Color> {
        let lower = name.to_ascii_lowercase();
        if lower == "transparent" {
            let mut color = Color::rgba(0.0, 0.0, 0.0, 0.0);
            color.original = Some(name.to_string());
            return Some(color);
        }
        BY_NAME.get(lower.as_str()).map(|[r, g, b]| {
            let mut color = Color::rgba(*r as f64, *g as f64, *b as f64, 1.0);
            color.original = Some(name.to_string());
            color
        })
    }

    /// `h` in degrees, `s` and `l` in percent.
    pub fn from_hsla(h: f64, s: f64, l: f64, a: f64) -> Self {
        let h = (h % 360.0 + 360.0) % 360.0 / 360.0;
        let s = clamp(s, 100.0) / 100.0;
        let l = clamp(l, 100.0) / 100.0;
        let m2 = if l <= 0.5 { l * (s + 1.0) } else { l + s - l * s };
        let m1 = l * 2.0 - m2;
        Color::rgba(
            hue_to_rgb(m1, m2, h + 1.0 / 3.0) * 255.0,
            hue_to_rgb(m1, m2, h) * 255.0,
            hue_to_rgb(m1, m2, h - 1.0 / 3.0) * 255.0,
            a,
        )
    }

    /// Hue in degrees, saturation and lightness in percent.
    pub fn to_hsl(&self) -> (f64, f64, f64) {
        let r = self.r / 255.0;
        let g = self.g / 255.0;
        let b = self.b / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;
        let l = (max + min) / 2.0;

        let h = if fuzzy_eq(delta, 0.0) {
            0.0
        } else if max == r {
            60.0 * (g - b) / delta
        } else if max == g {
            60.0 * (b - r) / delta + 120.0
        } else {
            60.0 * (r - g) / delta + 240.0
        };
        let s = if fuzzy_eq(delta, 0.0) {
            0.0
        } else if l < 0.5 {
            delta / (max + min)
        } else {
            delta / (2.0 - max - min)
        };
        ((h % 360.0 + 360.0) % 360.0, s * 100.0, l * 100.0)
    }

    pub fn with_alpha(&self, a: f64) -> Self {
        Color::rgba(self.r, self.g, self.b, a)
    }

    pub fn channels(&self) -> [u8; 3] {
        [
            self.r.round() as u8,
            self.g.round() as u8,
            self.b.round() as u8,
        ]
    }

    pub fn name(&self) -> Option<&'static str> {
        if !fuzzy_eq(self.a, 1.0) {
            return None;
        }
        BY_VALUE.get(&self.channels()).copied()
    }

    /// `#rrggbb`, shortened to `#rgb` when every channel is a doubled digit.
    pub fn hex(&self) -> String {
        let [r, g, b] = self.channels();
        let long = format!("#{:02x}{:02x}{:02x}", r, g, b);
        let bytes = long.as_bytes();
        if bytes[1] == bytes[2] && bytes[3] == bytes[4] && bytes[5] == bytes[6] {
            format!("#{}{}{}", bytes[1] as char, bytes[3] as char, bytes[5] as char)
        } else {
            long
        }
    }

    /// `#AARRGGBB` as expected by old IE filters.
    pub fn ie_hex(&self) -> String {
        let [r, g, b] = self.channels();
        let a = (self.a * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}{:02X}", a, r, g, b)
    }

    pub fn to_css(&self, compressed: bool) -> String {
        if let Some(original) = &self.original {
            return original.clone();
        }
        let [r, g, b] = self.channels();
        if !fuzzy_eq(self.a, 1.0) {
            if fuzzy_eq(self.a, 0.0) && r == 0 && g == 0 && b == 0 {
                return "transparent".to_string();
            }
            let sep = if compressed { "," } else { ", " };
            return format!(
                "rgba({}{sep}{}{sep}{}{sep}{})",
                r,
                g,
                b,
                format_number(self.a, compressed),
                sep = sep
            );
        }
        let hex = self.hex();
        match self.name() {
            Some(name) if !compressed || name.len() <= hex.len() => name.to_string(),
            _ => hex,
        }
    }

    pub fn equals(&self, other: &Color) -> bool {
        self.channels() == other.channels() && fuzzy_eq(self.a, other.a)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_colors_print_as_written() {
        let mut color = Color::rgba(255.0, 255.0, 255.0, 1.0);
        color.original = Some("#FFF".into());
        assert_eq!(color.to_css(false), "#FFF");
    }

    #[test]
    fn computed_colors_prefer_names_then_hex() {
        assert_eq!(Color::rgba(255.0, 0.0, 0.0, 1.0).to_css(false), "red");
        assert_eq!(Color::rgba(17.0, 34.0, 51.0, 1.0).to_css(false), "#123");
        assert_eq!(Color::rgba(18.0, 52.0, 86.0, 1.0).to_css(false), "#123456");
        assert_eq!(Color::rgba(255.0, 255.0, 255.0, 1.0).to_css(true), "#fff");
        assert_eq!(Color::rgba(0.0, 0.0, 0.0, 0.5).to_css(false), "rgba(0, 0, 0, 0.5)");
        assert_eq!(Color::rgba(0.0, 0.0, 0.0, 0.0).to_css(false), "transparent");
    }

    #[test]
    fn hsl_round_trip() {
        let color = Color::from_hsla(120.0, 100.0, 25.0, 1.0);
        assert_eq!(color.channels(), [0, 128, 0]);
        let (h, s, l) = color.to_hsl();
        assert!((h - 120.0).abs() < 0.5);
        assert!((s - 100.0).abs() < 0.5);
        assert!((l - 25.0).abs() < 0.5);
    }

    #[test]
    fn ie_hex_includes_alpha_first() {
        assert_eq!(Color::rgba(255.0, 0.0, 0.0, 0.5).ie_hex(), "#80FF0000");
    }
}
