//! Built-in demonstration bibliography, used when no library file is available

pub const DEMO_BIBTEX: &str = r#"
@article{Einstein:1935,
    author = {Einstein, A. and Podolsky, B. and Rosen, N.},
    doi = {10.1103/PhysRev.47.777},
    journal = {Phys. Rev.},
    month = {may},
    number = {10},
    pages = {777},
    title = {{Can Quantum-Mechanical Description of Physical Reality Be Considered Complete?}},
    volume = {47},
    year = {1935}}

@article{Watson:1953,
    Author = {Watson, J. D. and Crick, F. H. C.},
    Title = {{Molecular Structure of Nucleic Acids: A Structure for Deoxyribose Nucleic Acid}},
    Journal = {Nature},
    Year = {1953},
    Volume = {171},
    Number = {4356},
    Pages = {737},
    Month = {apr},
    Doi = {10.1038/171737a0},
}

@article{Franklin:1953,
    Author = {Franklin, Rosalind E. and Gosling, R. G.},
    Title = {{Evidence for 2-Chain Helix in Crystalline Structure of Sodium Deoxyribonucleate}},
    Journal = {Nature},
    Year = {1953},
    Volume = {172},
    Number = {4369},
    Pages = {156},
    Month = {jul},
    Doi = {10.1038/172156a0},
}
"#;
