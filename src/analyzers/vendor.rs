use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::{build_result, FrequencyAnalyzer, PatternCounter};
use crate::corpus::{PreprocessedData, SiteData};
use crate::domain;
use crate::options::{AnalysisOptions, PageType};
use crate::patterns::{TechnologyTable, VendorAttribution};
use crate::stats::AnalysisResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSpecificData {
    /// Every header name seen in the corpus that a `header-name` rule attributes.
    pub header_vendors: BTreeMap<String, VendorAttribution>,
    pub vendor_categories: BTreeMap<String, String>,
    pub sites_with_vendor: usize,
}

/// Attributes sites to vendors through a [`TechnologyTable`]. Pattern keys are vendor
/// names; examples are the evidence that matched.
#[derive(Debug, Clone, Copy)]
pub struct VendorAnalyzer<'a> {
    technologies: &'a TechnologyTable,
}

impl<'a> VendorAnalyzer<'a> {
    pub fn new(technologies: &'a TechnologyTable) -> Self {
        Self { technologies }
    }

    fn site_vendors(&self, site: &SiteData, page_type: PageType) -> BTreeSet<(VendorAttribution, String)> {
        let mut found = BTreeSet::new();
        for (name, values) in site.headers_for(page_type) {
            if let Some(vendor) = self.technologies.vendor_for_header(name) {
                found.insert((vendor, format!("header:{name}")));
            }
            for value in values {
                if let Some(vendor) = self.technologies.vendor_for_header_value(value) {
                    found.insert((vendor, format!("{name}:{value}")));
                }
            }
        }
        for src in &site.scripts {
            let Some(script) = domain::resolve_script(src, &site.url) else {
                continue;
            };
            if script.first_party {
                continue;
            }
            if let Some(vendor) = self.technologies.vendor_for_script_host(&script.host) {
                found.insert((vendor, format!("script:{}", script.host)));
            }
        }
        found
    }
}

impl FrequencyAnalyzer for VendorAnalyzer<'_> {
    type Specific = VendorSpecificData;

    fn name(&self) -> &'static str {
        "vendors"
    }

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<VendorSpecificData> {
        let start_time = Instant::now();
        let page_type = options.page_type;

        let counter = PatternCounter::count_sites(data, |site_id, site, acc| {
            for (vendor, evidence) in self.site_vendors(site, page_type) {
                acc.observe(site_id, &vendor.vendor, Some(&evidence));
            }
        });

        let mut specific = VendorSpecificData::default();
        let header_names: BTreeSet<&String> = data
            .sites
            .values()
            .flat_map(|site| site.headers_for(page_type).keys())
            .collect();
        for name in header_names {
            if let Some(vendor) = self.technologies.vendor_for_header(name) {
                specific.header_vendors.insert(name.clone(), vendor);
            }
        }
        for site in data.sites.values() {
            let vendors = self.site_vendors(site, page_type);
            if !vendors.is_empty() {
                specific.sites_with_vendor += 1;
            }
            for (vendor, _) in vendors {
                specific.vendor_categories.entry(vendor.vendor).or_insert(vendor.category);
            }
        }

        let patterns_found = counter.len();
        let patterns = counter.finish(data.total_sites, options.min_occurrences, true);

        build_result(
            self.name(),
            patterns,
            patterns_found,
            data,
            options,
            specific,
            start_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{corpus, site, with_header};

    #[test]
    fn attributes_headers_values_and_script_hosts() {
        let table = TechnologyTable::builtin().unwrap();
        let a = with_header(with_header(site("https://a.com", None), "cf-ray", "abc-AMS"), "server", "cloudflare");
        let mut b = with_header(site("https://b.com", None), "server", "nginx/1.25.3");
        b.scripts.insert("https://www.google-analytics.com/analytics.js".into());
        let c = with_header(site("https://c.com", None), "content-type", "text/html");

        let options = AnalysisOptions {
            min_occurrences: 1,
            ..AnalysisOptions::default()
        };
        let result = VendorAnalyzer::new(&table).analyze(&corpus(vec![a, b, c]), &options);

        let cloudflare = &result.patterns["Cloudflare"];
        assert_eq!(cloudflare.site_count, 1);
        assert_eq!(cloudflare.occurrence_count, Some(2));
        assert_eq!(result.patterns["Nginx"].site_count, 1);
        assert_eq!(result.patterns["Google Analytics"].site_count, 1);
        assert_eq!(result.analyzer_specific.header_vendors["cf-ray"].vendor, "Cloudflare");
        assert!(!result.analyzer_specific.header_vendors.contains_key("content-type"));
        assert_eq!(result.analyzer_specific.sites_with_vendor, 2);
        assert_eq!(result.analyzer_specific.vendor_categories["Nginx"], "infrastructure");
    }
}
