//! Products at the output boundary: cut sets and prime implicants.
//!
//! A [`Product`] is a conjunction of signed literals; a
//! [`ProductContainer`] is the minimized result of one fault-tree analysis,
//! ordered first by product size and then lexicographically, so listings
//! are stable across runs.

use std::fmt;

use crate::types::{Lit, Var};

/// One product: an ordered set of signed literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    literals: Vec<Lit>,
}

impl Product {
    pub fn new(mut literals: Vec<Lit>) -> Self {
        literals.sort();
        literals.dedup();
        Product { literals }
    }

    /// The unity product: an empty conjunction, always true.
    pub fn unity() -> Self {
        Product { literals: Vec::new() }
    }

    pub fn literals(&self) -> &[Lit] {
        &self.literals
    }

    /// The number of literals (the "order" of the product).
    pub fn order(&self) -> usize {
        self.literals.len()
    }

    pub fn is_unity(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn contains(&self, var: Var) -> bool {
        self.literals.iter().any(|lit| lit.var() == var)
    }

    /// Joint probability of the literals; `var_prob` is 1-indexed by
    /// variable.
    pub fn probability(&self, var_prob: &[f64]) -> f64 {
        let mut p = 1.0;
        for lit in &self.literals {
            let p_var = var_prob[lit.var().index()];
            p *= if lit.is_complement() { 1.0 - p_var } else { p_var };
        }
        p
    }
}

/// The ordered result set of one qualitative analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductContainer {
    products: Vec<Product>,
    /// Variable index (1-based) to basic-event name.
    names: Vec<String>,
}

impl ProductContainer {
    /// Builds the container, establishing the deterministic ordering:
    /// smaller products first, ties broken lexicographically.
    pub fn new(mut products: Vec<Product>, names: Vec<String>) -> Self {
        products.sort_by(|lhs, rhs| {
            lhs.order()
                .cmp(&rhs.order())
                .then_with(|| lhs.literals.cmp(&rhs.literals))
        });
        products.dedup();
        ProductContainer { products, names }
    }

    pub fn empty() -> Self {
        ProductContainer { products: Vec::new(), names: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// True if the result is the single unity product: failure guaranteed.
    pub fn is_unity(&self) -> bool {
        self.products.len() == 1 && self.products[0].is_unity()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Product> {
        self.products.iter()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// The name of a variable's basic event.
    pub fn event_name(&self, var: Var) -> &str {
        &self.names[var.index()]
    }

    /// How many products there are of each order, starting at order 1.
    pub fn distribution(&self) -> Vec<usize> {
        let max = self.products.iter().map(Product::order).max().unwrap_or(0);
        let mut distribution = vec![0; max];
        for product in &self.products {
            if product.order() > 0 {
                distribution[product.order() - 1] += 1;
            }
        }
        distribution
    }

    /// Products as sorted lists of signed event names, for comparisons in
    /// tests and reports.
    pub fn named_products(&self) -> Vec<Vec<String>> {
        self.products
            .iter()
            .map(|product| {
                product
                    .literals()
                    .iter()
                    .map(|lit| {
                        let name = self.event_name(lit.var());
                        if lit.is_complement() {
                            format!("~{}", name)
                        } else {
                            name.to_string()
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ProductContainer {
    type Item = &'a Product;
    type IntoIter = std::slice::Iter<'a, Product>;

    fn into_iter(self) -> Self::IntoIter {
        self.products.iter()
    }
}

impl fmt::Display for ProductContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no products");
        }
        if self.is_unity() {
            return writeln!(f, "unity product");
        }
        writeln!(f, "{} : {:?}", self.len(), self.distribution())?;
        for product in &self.products {
            let names: Vec<String> = product
                .literals()
                .iter()
                .map(|lit| {
                    let name = self.event_name(lit.var());
                    if lit.is_complement() {
                        format!("~{}", name)
                    } else {
                        name.to_string()
                    }
                })
                .collect();
            writeln!(f, "  {}", names.join(" "))?;
        }
        Ok(())
    }
}
