//! detect_stack: deterministic technology detection over page markup.
//!
//! Detection is a pure function of its input: an ordered detector table is
//! matched against the markup (plus response headers when the capability had
//! to fetch the page itself). No state survives between calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{RegexSet, RegexSetBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capabilities::fetch::{fetch_capped, parse_http_url};
use crate::capabilities::{
    parse_input, schema_of, Capability, CapabilityError, CapabilityErrorKind, CapabilityKind,
    CapabilityResult,
};

pub const MAX_DETECT_BYTES: usize = 80_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TechCategory {
    Frameworks,
    Languages,
    Hosting,
    Cms,
    Analytics,
    Ecommerce,
    Styling,
    Other,
}

impl TechCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TechCategory::Frameworks => "frameworks",
            TechCategory::Languages => "languages",
            TechCategory::Hosting => "hosting",
            TechCategory::Cms => "cms",
            TechCategory::Analytics => "analytics",
            TechCategory::Ecommerce => "ecommerce",
            TechCategory::Styling => "styling",
            TechCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TechnologySignal {
    pub technology: String,
    pub category: TechCategory,
    pub evidence: String,
}

/// Technologies grouped by category, in detector order within each bucket.
pub type StackBreakdown = BTreeMap<TechCategory, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub stack: StackBreakdown,
    pub signals: Vec<TechnologySignal>,
}

struct Detector {
    name: &'static str,
    category: TechCategory,
    patterns: &'static [&'static str],
    evidence: &'static str,
}

use TechCategory::*;

#[rustfmt::skip]
const DETECTORS: &[Detector] = &[
    // Frameworks
    Detector { name: "Next.js", category: Frameworks, patterns: &[r"__NEXT_DATA__", r"/_next/static/"], evidence: "Next.js data script or static asset path" },
    Detector { name: "Nuxt", category: Frameworks, patterns: &[r"__NUXT__", r"/_nuxt/"], evidence: "Nuxt state object or asset path" },
    Detector { name: "Gatsby", category: Frameworks, patterns: &[r"___gatsby", r"gatsby-"], evidence: "Gatsby root container" },
    Detector { name: "Remix", category: Frameworks, patterns: &[r"__remixContext"], evidence: "Remix context script" },
    Detector { name: "React", category: Frameworks, patterns: &[r"data-reactroot", r"react-dom", r"__NEXT_DATA__", r"___gatsby"], evidence: "React root attribute or bundle" },
    Detector { name: "Vue.js", category: Frameworks, patterns: &[r"data-v-[0-9a-f]{6,}", r"vue(?:\.min)?\.js", r"__NUXT__"], evidence: "Vue scoped attributes or bundle" },
    Detector { name: "Angular", category: Frameworks, patterns: &[r"ng-version=", r"ng-app"], evidence: "Angular version attribute" },
    Detector { name: "Svelte", category: Frameworks, patterns: &[r"svelte-[a-z0-9]{4,}", r"__sveltekit"], evidence: "Svelte scoped class names" },
    Detector { name: "jQuery", category: Frameworks, patterns: &[r"jquery(?:[.-]\d[\w.]*)?(?:\.min)?\.js"], evidence: "jQuery script include" },
    Detector { name: "Ruby on Rails", category: Frameworks, patterns: &[r#"name="csrf-param""#, r"authenticity_token"], evidence: "Rails CSRF meta tags" },
    Detector { name: "Django", category: Frameworks, patterns: &[r"csrfmiddlewaretoken"], evidence: "Django CSRF form field" },
    Detector { name: "ASP.NET", category: Frameworks, patterns: &[r"__VIEWSTATE", r"x-aspnet-version"], evidence: "ASP.NET view state" },
    // Languages
    Detector { name: "PHP", category: Languages, patterns: &[r"\.php\b", r"x-powered-by:\s*php", r"phpsessid"], evidence: "PHP file extension or session cookie" },
    Detector { name: "Java", category: Languages, patterns: &[r"jsessionid", r"\.jsp\b"], evidence: "Java servlet session or JSP page" },
    Detector { name: "Ruby", category: Languages, patterns: &[r#"name="csrf-param""#], evidence: "Rails-style markup" },
    Detector { name: "Python", category: Languages, patterns: &[r"csrfmiddlewaretoken", r"x-powered-by:\s*(?:django|flask)"], evidence: "Python web framework markers" },
    Detector { name: "TypeScript", category: Languages, patterns: &[r"\.tsx?\.map\b", r"sourceMappingURL=[^\s]+\.ts"], evidence: "TypeScript source maps" },
    // Hosting
    Detector { name: "Vercel", category: Hosting, patterns: &[r"server:\s*vercel", r"x-vercel-", r"vercel\.app", r"/_vercel/"], evidence: "Vercel header or domain" },
    Detector { name: "Netlify", category: Hosting, patterns: &[r"server:\s*netlify", r"x-nf-request-id", r"netlify\.app"], evidence: "Netlify header or domain" },
    Detector { name: "Cloudflare", category: Hosting, patterns: &[r"server:\s*cloudflare", r"cf-ray:", r"/cdn-cgi/"], evidence: "Cloudflare header or CDN path" },
    Detector { name: "AWS", category: Hosting, patterns: &[r"amazonaws\.com", r"cloudfront\.net", r"x-amz-"], evidence: "AWS S3/CloudFront asset host" },
    Detector { name: "Heroku", category: Hosting, patterns: &[r"herokuapp\.com"], evidence: "Heroku app domain" },
    Detector { name: "GitHub Pages", category: Hosting, patterns: &[r"github\.io", r"server:\s*github\.com"], evidence: "GitHub Pages domain" },
    Detector { name: "Google Cloud", category: Hosting, patterns: &[r"storage\.googleapis\.com", r"server:\s*google frontend"], evidence: "Google Cloud asset host" },
    // CMS
    Detector { name: "WordPress", category: Cms, patterns: &[r"wp-content/", r"wp-includes/", r#"content="wordpress"#], evidence: "WordPress asset paths" },
    Detector { name: "Drupal", category: Cms, patterns: &[r"drupal-settings-json", r"/sites/default/files/", r#"content="drupal"#], evidence: "Drupal settings or file paths" },
    Detector { name: "Webflow", category: Cms, patterns: &[r"data-wf-page", r"webflow\.com", r"website-files\.com"], evidence: "Webflow page attributes" },
    Detector { name: "Squarespace", category: Cms, patterns: &[r"squarespace\.com", r"static1\.squarespace"], evidence: "Squarespace asset host" },
    Detector { name: "Wix", category: Cms, patterns: &[r"wixstatic\.com", r"_wixCIDX"], evidence: "Wix static host" },
    Detector { name: "Ghost", category: Cms, patterns: &[r#"content="ghost"#, r"ghost-(?:url|portal)"], evidence: "Ghost generator tag" },
    Detector { name: "Contentful", category: Cms, patterns: &[r"ctfassets\.net"], evidence: "Contentful asset host" },
    Detector { name: "Sanity", category: Cms, patterns: &[r"cdn\.sanity\.io"], evidence: "Sanity image CDN" },
    Detector { name: "HubSpot CMS", category: Cms, patterns: &[r"hs-sites\.com", r"hubspotusercontent"], evidence: "HubSpot hosted content" },
    // Analytics
    Detector { name: "Google Analytics", category: Analytics, patterns: &[r"google-analytics\.com", r"gtag\(", r"googletagmanager\.com/gtag/js"], evidence: "gtag/analytics script" },
    Detector { name: "Google Tag Manager", category: Analytics, patterns: &[r"googletagmanager\.com/gtm\.js", r"GTM-[A-Z0-9]{4,}"], evidence: "GTM container snippet" },
    Detector { name: "Segment", category: Analytics, patterns: &[r"cdn\.segment\.com", r"analytics\.load\("], evidence: "Segment analytics.js" },
    Detector { name: "Mixpanel", category: Analytics, patterns: &[r"cdn\.mxpnl\.com", r"mixpanel\.init"], evidence: "Mixpanel snippet" },
    Detector { name: "Amplitude", category: Analytics, patterns: &[r"cdn\.amplitude\.com", r"amplitude\.getInstance"], evidence: "Amplitude SDK" },
    Detector { name: "Hotjar", category: Analytics, patterns: &[r"static\.hotjar\.com", r"hjSiteSettings"], evidence: "Hotjar tracking code" },
    Detector { name: "Plausible", category: Analytics, patterns: &[r"plausible\.io/js"], evidence: "Plausible script" },
    Detector { name: "PostHog", category: Analytics, patterns: &[r"posthog\.init", r"app\.posthog\.com", r"us\.i\.posthog\.com"], evidence: "PostHog snippet" },
    // Ecommerce
    Detector { name: "Shopify", category: Ecommerce, patterns: &[r"cdn\.shopify\.com", r"Shopify\.theme", r"myshopify\.com"], evidence: "Shopify CDN or theme object" },
    Detector { name: "WooCommerce", category: Ecommerce, patterns: &[r"woocommerce"], evidence: "WooCommerce classes or assets" },
    Detector { name: "Magento", category: Ecommerce, patterns: &[r"mage/cookies", r"Magento_"], evidence: "Magento modules" },
    Detector { name: "BigCommerce", category: Ecommerce, patterns: &[r"bigcommerce\.com", r"cdn\d*\.bigcommerce"], evidence: "BigCommerce CDN" },
    Detector { name: "Stripe", category: Ecommerce, patterns: &[r"js\.stripe\.com"], evidence: "Stripe.js include" },
    // Styling
    Detector { name: "Tailwind CSS", category: Styling, patterns: &[r"tailwindcss", r#"class="[^"]*\b(?:px|py|mx|my|mt|mb)-\d+\b[^"]*\b(?:text|bg)-(?:gray|slate|zinc|neutral)-\d{2,3}\b"#], evidence: "Tailwind utility classes" },
    Detector { name: "Bootstrap", category: Styling, patterns: &[r"bootstrap(?:\.min)?\.(?:css|js)", r#"class="[^"]*\bcol-(?:sm|md|lg)-\d+"#], evidence: "Bootstrap assets or grid classes" },
    Detector { name: "Material UI", category: Styling, patterns: &[r"Mui[A-Z][A-Za-z]+-root"], evidence: "MUI component classes" },
    Detector { name: "styled-components", category: Styling, patterns: &[r"data-styled", r"sc-component-id"], evidence: "styled-components style tags" },
    Detector { name: "Font Awesome", category: Styling, patterns: &[r"font-?awesome", r"\bfa-solid\b"], evidence: "Font Awesome stylesheet or icons" },
    Detector { name: "Google Fonts", category: Styling, patterns: &[r"fonts\.googleapis\.com"], evidence: "Google Fonts stylesheet" },
    // Other
    Detector { name: "Intercom", category: Other, patterns: &[r"widget\.intercom\.io", r"intercomSettings"], evidence: "Intercom messenger" },
    Detector { name: "Sentry", category: Other, patterns: &[r"browser\.sentry-cdn\.com", r"Sentry\.init"], evidence: "Sentry browser SDK" },
    Detector { name: "reCAPTCHA", category: Other, patterns: &[r"google\.com/recaptcha", r"g-recaptcha"], evidence: "reCAPTCHA widget" },
    Detector { name: "HubSpot", category: Other, patterns: &[r"js\.hs-scripts\.com", r"hs-analytics"], evidence: "HubSpot tracking script" },
    Detector { name: "Zendesk", category: Other, patterns: &[r"static\.zdassets\.com", r"zESettings"], evidence: "Zendesk widget" },
    Detector { name: "Greenhouse", category: Other, patterns: &[r"boards\.greenhouse\.io", r"grnhse"], evidence: "Greenhouse job board embed" },
    Detector { name: "Lever", category: Other, patterns: &[r"jobs\.lever\.co"], evidence: "Lever job board link" },
];

static COMPILED: Lazy<Vec<RegexSet>> = Lazy::new(|| {
    DETECTORS
        .iter()
        .map(|d| {
            RegexSetBuilder::new(d.patterns)
                .case_insensitive(true)
                .build()
                .expect("detector patterns compile")
        })
        .collect()
});

/// Runs every detector over `markup` in table order.
pub fn detect_technologies(markup: &str) -> Detection {
    let mut detection = Detection::default();
    for (detector, patterns) in DETECTORS.iter().zip(COMPILED.iter()) {
        if !patterns.is_match(markup) {
            continue;
        }
        let bucket = detection.stack.entry(detector.category).or_default();
        if bucket.iter().any(|name| name == detector.name) {
            continue;
        }
        bucket.push(detector.name.to_string());
        detection.signals.push(TechnologySignal {
            technology: detector.name.to_string(),
            category: detector.category,
            evidence: detector.evidence.to_string(),
        });
    }
    detection
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectStackInput {
    /// Page markup. When absent the capability fetches `url` itself.
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectStackOutput {
    pub source: String,
    pub stack: StackBreakdown,
    pub signals: Vec<TechnologySignal>,
}

pub struct DetectStackCapability {
    http: reqwest::Client,
}

impl DetectStackCapability {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Capability for DetectStackCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::DetectStack
    }

    fn description(&self) -> &'static str {
        "Detect frameworks, hosting, CMS, analytics, ecommerce and styling technologies from page markup or a URL"
    }

    fn input_schema(&self) -> Value {
        schema_of::<DetectStackInput>()
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> CapabilityResult {
        let input: DetectStackInput = parse_input(input)?;

        let (source, detection) = match (input.html, input.url) {
            (Some(html), _) if !html.trim().is_empty() => ("markup", detect_technologies(&html)),
            (_, Some(url)) => {
                let url = parse_http_url(&url)?;
                let fetched = fetch_capped(&self.http, &url, MAX_DETECT_BYTES, cancel).await?;
                let mut scanned = fetched.body;
                for (name, value) in fetched.headers.iter() {
                    if let Ok(value) = value.to_str() {
                        scanned.push_str(&format!("\n{}: {}", name.as_str(), value));
                    }
                }
                ("fetch", detect_technologies(&scanned))
            }
            _ => {
                return Err(CapabilityError::invalid_input(
                    "either html or url must be provided",
                ))
            }
        };

        serde_json::to_value(DetectStackOutput {
            source: source.to_string(),
            stack: detection.stack,
            signals: detection.signals,
        })
        .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}
