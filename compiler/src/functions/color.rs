use crate::arguments::{coerce_color, Args};
use crate::color::Color;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::runtime_value::Value;

use super::{css_call, number, percent_arg, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("rgb", &["($red, $green, $blue)", "($color, $alpha)"], rgb);
    registry.add("rgba", &["($red, $green, $blue, $alpha)", "($color, $alpha)"], rgba);
    registry.add("hsl", &["($hue, $saturation, $lightness)"], hsl);
    registry.add("hsla", &["($hue, $saturation, $lightness, $alpha)"], hsla);

    registry.add("red", &["($color)"], red);
    registry.add("green", &["($color)"], green);
    registry.add("blue", &["($color)"], blue);
    registry.add("hue", &["($color)"], hue);
    registry.add("saturation", &["($color)"], saturation);
    registry.add("lightness", &["($color)"], lightness);
    registry.add("alpha", &["($color)"], alpha);
    registry.add("opacity", &["($color)"], opacity);

    registry.add("mix", &["($color1, $color2, $weight: 50%)"], mix);
    registry.add("lighten", &["($color, $amount)"], lighten);
    registry.add("darken", &["($color, $amount)"], darken);
    registry.add("saturate", &["($color, $amount)", "($amount)"], saturate);
    registry.add("desaturate", &["($color, $amount)"], desaturate);
    registry.add("adjust-hue", &["($color, $degrees)"], adjust_hue);
    registry.add("complement", &["($color)"], complement);
    registry.add("invert", &["($color, $weight: 100%)"], invert);
    registry.add("grayscale", &["($color)"], grayscale);

    registry.add("opacify", &["($color, $amount)"], opacify);
    registry.add("fade-in", &["($color, $amount)"], opacify);
    registry.add("transparentize", &["($color, $amount)"], transparentize);
    registry.add("fade-out", &["($color, $amount)"], transparentize);

    registry.add("adjust-color", &["($color, $kwargs...)"], adjust_color);
    registry.add("scale-color", &["($color, $kwargs...)"], scale_color);
    registry.add("change-color", &["($color, $kwargs...)"], change_color);
    registry.add("ie-hex-str", &["($color)"], ie_hex_str);
}

/// An RGB channel in 0..=255; percentages scale to that range. `None` for
/// values only the browser can resolve, such as `var(--r)`.
fn rgb_channel(args: &Args, name: &str) -> Result<Option<f64>, CompileError> {
    match args.get(name) {
        Value::Number(n) if n.has_unit("%") => Ok(Some(n.value * 255.0 / 100.0)),
        Value::Number(n) if n.is_unitless() => Ok(Some(n.value)),
        Value::Number(n) => Err(CompileError::Argument(format!(
            "${}: Expected {} to have no units or \"%\".",
            name,
            n.to_css(false)?
        ))),
        Value::String { .. } => Ok(None),
        other => Err(CompileError::type_error(name, other, "number")),
    }
}

/// An alpha channel in 0..=1.
fn alpha_channel(args: &Args, name: &str) -> Result<Option<f64>, CompileError> {
    match args.get(name) {
        Value::Number(n) if n.has_unit("%") => Ok(Some(n.value / 100.0)),
        Value::Number(n) => Ok(Some(n.value)),
        Value::String { .. } => Ok(None),
        other => Err(CompileError::type_error(name, other, "number")),
    }
}

/// Hue in degrees, saturation and lightness as percentages.
fn hsl_channel(args: &Args, name: &str) -> Result<Option<f64>, CompileError> {
    match args.get(name) {
        Value::Number(n) => Ok(Some(n.value)),
        Value::String { .. } => Ok(None),
        other => Err(CompileError::type_error(name, other, "number")),
    }
}

/// Values of `names` in order, for handing an unresolvable call to the browser.
fn values_of(args: &Args, names: &[&str]) -> Vec<Value> {
    names.iter().map(|name| args.get(name).clone()).collect()
}

fn color_with_alpha(exec: &Executor<'_>, name: &str, args: &Args) -> Result<Value, CompileError> {
    let Some(color) = coerce_color(args.get("color")) else {
        if matches!(args.get("color"), Value::String { .. }) {
            return css_call(exec, name, &values_of(args, &["color", "alpha"]));
        }
        return Err(CompileError::type_error("color", args.get("color"), "color"));
    };
    match alpha_channel(args, "alpha")? {
        Some(a) => Ok(Value::Color(color.with_alpha(a))),
        None => css_call(exec, name, &values_of(args, &["color", "alpha"])),
    }
}

fn rgb(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    if args.prototype == 1 {
        return color_with_alpha(exec, "rgb", args);
    }
    match (rgb_channel(args, "red")?, rgb_channel(args, "green")?, rgb_channel(args, "blue")?) {
        (Some(r), Some(g), Some(b)) => Ok(Value::Color(Color::rgba(r, g, b, 1.0))),
        _ => css_call(exec, "rgb", &values_of(args, &["red", "green", "blue"])),
    }
}

fn rgba(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    if args.prototype == 1 {
        return color_with_alpha(exec, "rgba", args);
    }
    let channels = (
        rgb_channel(args, "red")?,
        rgb_channel(args, "green")?,
        rgb_channel(args, "blue")?,
        alpha_channel(args, "alpha")?,
    );
    match channels {
        (Some(r), Some(g), Some(b), Some(a)) => Ok(Value::Color(Color::rgba(r, g, b, a))),
        _ => css_call(exec, "rgba", &values_of(args, &["red", "green", "blue", "alpha"])),
    }
}

fn hsl(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let channels = (
        hsl_channel(args, "hue")?,
        hsl_channel(args, "saturation")?,
        hsl_channel(args, "lightness")?,
    );
    match channels {
        (Some(h), Some(s), Some(l)) => Ok(Value::Color(Color::from_hsla(h, s, l, 1.0))),
        _ => css_call(exec, "hsl", &values_of(args, &["hue", "saturation", "lightness"])),
    }
}

fn hsla(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let channels = (
        hsl_channel(args, "hue")?,
        hsl_channel(args, "saturation")?,
        hsl_channel(args, "lightness")?,
        alpha_channel(args, "alpha")?,
    );
    match channels {
        (Some(h), Some(s), Some(l), Some(a)) => Ok(Value::Color(Color::from_hsla(h, s, l, a))),
        _ => css_call(
            exec,
            "hsla",
            &values_of(args, &["hue", "saturation", "lightness", "alpha"]),
        ),
    }
}

fn red(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.channels()[0] as f64, ""))
}

fn green(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.channels()[1] as f64, ""))
}

fn blue(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.channels()[2] as f64, ""))
}

fn hue(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.to_hsl().0, "deg"))
}

fn saturation(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.to_hsl().1, "%"))
}

fn lightness(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.color("color")?.to_hsl().2, "%"))
}

/// `alpha()` and `opacity()` also exist as CSS filter and IE syntax; those
/// pass through untouched.
fn alpha_like(exec: &Executor<'_>, name: &str, args: &Args) -> Result<Value, CompileError> {
    match coerce_color(args.get("color")) {
        Some(color) => Ok(number(color.a, "")),
        None => css_call(exec, name, &values_of(args, &["color"])),
    }
}

fn alpha(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    alpha_like(exec, "alpha", args)
}

fn opacity(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    alpha_like(exec, "opacity", args)
}

/// Weighted average of two colors; `weight` is the share of `first` in 0..=1.
fn mix_colors(first: &Color, second: &Color, weight: f64) -> Color {
    let w = weight * 2.0 - 1.0;
    let a = first.a - second.a;
    let combined = if w * a == -1.0 { w } else { (w + a) / (1.0 + w * a) };
    let w1 = (combined + 1.0) / 2.0;
    let w2 = 1.0 - w1;
    Color::rgba(
        first.r * w1 + second.r * w2,
        first.g * w1 + second.g * w2,
        first.b * w1 + second.b * w2,
        first.a * weight + second.a * (1.0 - weight),
    )
}

fn mix(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let first = args.color("color1")?;
    let second = args.color("color2")?;
    let weight = percent_arg(args, "weight", 0.0, 100.0)? / 100.0;
    Ok(Value::Color(mix_colors(&first, &second, weight)))
}

/// Rebuild `color` with its HSL channels passed through `f`.
fn map_hsl(color: &Color, f: impl FnOnce(f64, f64, f64) -> (f64, f64, f64)) -> Value {
    let (h, s, l) = color.to_hsl();
    let (h, s, l) = f(h, s, l);
    Value::Color(Color::from_hsla(h, s, l, color.a))
}

fn lighten(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let amount = percent_arg(args, "amount", 0.0, 100.0)?;
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h, s, l + amount)))
}

fn darken(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let amount = percent_arg(args, "amount", 0.0, 100.0)?;
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h, s, l - amount)))
}

fn saturate(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    if args.prototype == 1 {
        return css_call(exec, "saturate", &values_of(args, &["amount"]));
    }
    let amount = percent_arg(args, "amount", 0.0, 100.0)?;
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h, s + amount, l)))
}

fn desaturate(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let amount = percent_arg(args, "amount", 0.0, 100.0)?;
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h, s - amount, l)))
}

fn adjust_hue(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let degrees = args.number("degrees")?.value;
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h + degrees, s, l)))
}

fn complement(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(map_hsl(&args.color("color")?, |h, s, l| (h + 180.0, s, l)))
}

fn grayscale(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    if let Value::Number(_) = args.get("color") {
        return css_call(exec, "grayscale", &values_of(args, &["color"]));
    }
    Ok(map_hsl(&args.color("color")?, |h, _, l| (h, 0.0, l)))
}

fn invert(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    if let Value::Number(_) = args.get("color") {
        return css_call(exec, "invert", &values_of(args, &["color"]));
    }
    let color = args.color("color")?;
    let weight = percent_arg(args, "weight", 0.0, 100.0)? / 100.0;
    let inverted = Color::rgba(255.0 - color.r, 255.0 - color.g, 255.0 - color.b, color.a);
    Ok(Value::Color(mix_colors(&inverted, &color, weight)))
}

/// An alpha amount in 0..=1.
fn alpha_amount(args: &Args) -> Result<f64, CompileError> {
    let n = args.number("amount")?;
    if !(0.0..=1.0).contains(&n.value) {
        return Err(CompileError::Argument(format!(
            "$amount: Amount {} must be between 0 and 1.",
            n.to_css(false)?
        )));
    }
    Ok(n.value)
}

fn opacify(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let color = args.color("color")?;
    let amount = alpha_amount(args)?;
    Ok(Value::Color(color.with_alpha(color.a + amount)))
}

fn transparentize(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let color = args.color("color")?;
    let amount = alpha_amount(args)?;
    Ok(Value::Color(color.with_alpha(color.a - amount)))
}

/// Channel keywords of `adjust-color()` and friends.
#[derive(Debug, Default)]
struct Channels {
    red: Option<f64>,
    green: Option<f64>,
    blue: Option<f64>,
    hue: Option<f64>,
    saturation: Option<f64>,
    lightness: Option<f64>,
    alpha: Option<f64>,
}

/// Read the channel keywords. `percent` requires percentages, as
/// `scale-color()` does; `allow_hue` is false for `scale-color()`.
fn channels(args: &Args, function: &str, percent: bool, allow_hue: bool) -> Result<Channels, CompileError> {
    if !args.rest_items().is_empty() {
        return Err(CompileError::Argument(format!(
            "{}: Only one positional argument is allowed. All other arguments must be passed by name.",
            function
        )));
    }
    let mut out = Channels::default();
    for (name, value) in args.rest_keywords() {
        let n = match &value {
            Value::Number(n) => n.clone(),
            other => return Err(CompileError::type_error(&name, other, "number")),
        };
        if percent && !n.has_unit("%") {
            return Err(CompileError::Argument(format!(
                "${}: Expected {} to have unit \"%\".",
                name,
                n.to_css(false)?
            )));
        }
        let slot = match name.as_str() {
            "red" => &mut out.red,
            "green" => &mut out.green,
            "blue" => &mut out.blue,
            "hue" if allow_hue => &mut out.hue,
            "saturation" => &mut out.saturation,
            "lightness" => &mut out.lightness,
            "alpha" => &mut out.alpha,
            _ => {
                return Err(CompileError::Argument(format!(
                    "{}: No argument named ${}.",
                    function, name
                )));
            }
        };
        *slot = Some(n.value);
    }
    Ok(out)
}

/// Apply `f(current, requested, max)` to every channel that was given.
fn apply_channels(color: &Color, channels: &Channels, f: impl Fn(f64, f64, f64) -> f64) -> Result<Color, CompileError> {
    let has_rgb = channels.red.is_some() || channels.green.is_some() || channels.blue.is_some();
    let has_hsl = channels.hue.is_some() || channels.saturation.is_some() || channels.lightness.is_some();
    if has_rgb && has_hsl {
        return Err(CompileError::custom(
            "RGB parameters may not be passed along with HSL parameters.",
        ));
    }
    let pick = |current: f64, requested: Option<f64>, max: f64| match requested {
        Some(value) => f(current, value, max),
        None => current,
    };
    let a = pick(color.a, channels.alpha, 1.0);
    if has_rgb {
        return Ok(Color::rgba(
            pick(color.r, channels.red, 255.0),
            pick(color.g, channels.green, 255.0),
            pick(color.b, channels.blue, 255.0),
            a,
        ));
    }
    if has_hsl {
        let (h, s, l) = color.to_hsl();
        return Ok(Color::from_hsla(
            pick(h, channels.hue, 360.0),
            pick(s, channels.saturation, 100.0),
            pick(l, channels.lightness, 100.0),
            a,
        ));
    }
    Ok(color.with_alpha(a))
}

fn adjust_color(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let color = args.color("color")?;
    let channels = channels(args, "adjust-color", false, true)?;
    Ok(Value::Color(apply_channels(&color, &channels, |current, by, _| current + by)?))
}

fn scale_color(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let color = args.color("color")?;
    let channels = channels(args, "scale-color", true, false)?;
    let scaled = apply_channels(&color, &channels, |current, by, max| {
        let room = if by > 0.0 { max - current } else { current };
        current + room * by / 100.0
    })?;
    Ok(Value::Color(scaled))
}

fn change_color(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let color = args.color("color")?;
    let channels = channels(args, "change-color", false, true)?;
    Ok(Value::Color(apply_channels(&color, &channels, |_, to, _| to)?))
}

fn ie_hex_str(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::string(args.color("color")?.ie_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_halfway_between_black_and_white() {
        let black = Color::rgba(0.0, 0.0, 0.0, 1.0);
        let white = Color::rgba(255.0, 255.0, 255.0, 1.0);
        let gray = mix_colors(&black, &white, 0.5);
        assert_eq!(gray.channels(), [128, 128, 128]);
        assert_eq!(mix_colors(&black, &white, 1.0).channels(), [0, 0, 0]);
    }

    #[test]
    fn rgb_and_hsl_adjustments_do_not_mix() {
        let color = Color::rgba(10.0, 20.0, 30.0, 1.0);
        let both = Channels {
            red: Some(1.0),
            hue: Some(1.0),
            ..Channels::default()
        };
        assert!(apply_channels(&color, &both, |c, by, _| c + by).is_err());

        let alpha_only = Channels {
            alpha: Some(-0.5),
            ..Channels::default()
        };
        let faded = apply_channels(&color, &alpha_only, |c, by, _| c + by).unwrap();
        assert_eq!(faded.channels(), [10, 20, 30]);
        assert!((faded.a - 0.5).abs() < 1e-9);
    }
}
